//! Daily balance schema.
//!
//! Creates the chart of accounts, the account registry, the transaction
//! journal, and the two balance tables written by the daily balance job.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: CHART OF ACCOUNTS & REGISTRY
        // ============================================================
        db.execute_unprepared(SUB_CATEGORIES_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 2: JOURNAL
        // ============================================================
        db.execute_unprepared(ACCOUNT_TRANSACTIONS_SQL).await?;

        // ============================================================
        // PART 3: BALANCES
        // ============================================================
        db.execute_unprepared(ACCOUNT_BALANCE_DAILY_SQL).await?;
        db.execute_unprepared(ACCOUNT_TRIAL_BALANCE_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const SUB_CATEGORIES_SQL: &str = r"
CREATE TABLE sub_categories (
    code VARCHAR(50) PRIMARY KEY,
    category_code VARCHAR(50) NOT NULL,
    name VARCHAR(255) NOT NULL,
    coa_type VARCHAR(20) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT chk_sub_categories_coa_type CHECK (
        lower(coa_type) IN ('asset', 'expense', 'liability', 'equity', 'revenue')
    )
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    account_number VARCHAR(50) PRIMARY KEY,
    entity_code VARCHAR(50) NOT NULL,
    category_code VARCHAR(50) NOT NULL,
    sub_category_code VARCHAR(50) NOT NULL REFERENCES sub_categories(code),
    name VARCHAR(255) NOT NULL,
    coa_type VARCHAR(20),
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_accounts_scope ON accounts(entity_code, sub_category_code)
    WHERE is_active = true;
";

const ACCOUNT_TRANSACTIONS_SQL: &str = r"
CREATE TABLE account_transactions (
    id BIGSERIAL PRIMARY KEY,
    account_number VARCHAR(50) NOT NULL REFERENCES accounts(account_number),
    transaction_date DATE NOT NULL,
    debit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    credit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT chk_account_transactions_non_negative CHECK (debit >= 0 AND credit >= 0)
);

CREATE INDEX idx_account_transactions_date ON account_transactions(transaction_date, account_number);
";

const ACCOUNT_BALANCE_DAILY_SQL: &str = r"
CREATE TABLE account_balance_daily (
    account_number VARCHAR(50) NOT NULL,
    balance_date DATE NOT NULL,
    entity_code VARCHAR(50) NOT NULL,
    category_code VARCHAR(50) NOT NULL,
    sub_category_code VARCHAR(50) NOT NULL,
    opening_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    debit_movement NUMERIC(20, 4) NOT NULL DEFAULT 0,
    credit_movement NUMERIC(20, 4) NOT NULL DEFAULT 0,
    closing_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    PRIMARY KEY (account_number, balance_date)
);

CREATE INDEX idx_account_balance_daily_date ON account_balance_daily(balance_date, entity_code);
";

const ACCOUNT_TRIAL_BALANCE_SQL: &str = r"
CREATE TABLE account_trial_balance (
    entity_code VARCHAR(50) NOT NULL,
    sub_category_code VARCHAR(50) NOT NULL,
    balance_date DATE NOT NULL,
    opening_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    debit_movement NUMERIC(20, 4) NOT NULL DEFAULT 0,
    credit_movement NUMERIC(20, 4) NOT NULL DEFAULT 0,
    closing_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    account_count BIGINT NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    PRIMARY KEY (entity_code, sub_category_code, balance_date)
);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS account_trial_balance;
DROP TABLE IF EXISTS account_balance_daily;
DROP TABLE IF EXISTS account_transactions;
DROP TABLE IF EXISTS accounts;
DROP TABLE IF EXISTS sub_categories;
";
