//! Bulk upserts of computed balances.

use chrono::NaiveDate;
use daybook_core::balance::{AccountBalanceDaily, AccountTrialBalance};
use daybook_core::persist::{BalanceSink, ClearedRows, PersistError};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::debug;

use crate::entities::{account_balance_daily, account_trial_balance};
use crate::error::persist_error;

/// Rows per INSERT statement, keeping bind parameters under the
/// PostgreSQL limit of 65535.
pub const ROWS_PER_STATEMENT: usize = 4000;

/// Writes account balance and trial balance rows to PostgreSQL.
///
/// Each call runs in one transaction. Rows for a key that already exists
/// are overwritten; rows a rerun no longer produces are deleted by
/// [`BalanceSink::clear_balances`].
#[derive(Debug, Clone)]
pub struct PgBalanceSink {
    db: DatabaseConnection,
}

impl PgBalanceSink {
    /// Creates a new sink.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl BalanceSink for PgBalanceSink {
    async fn clear_balances(
        &self,
        business_date: NaiveDate,
        entity_codes: &[String],
    ) -> Result<ClearedRows, PersistError> {
        if entity_codes.is_empty() {
            return Ok(ClearedRows::default());
        }

        let txn = self.db.begin().await.map_err(persist_error)?;
        let accounts = account_balance_daily::Entity::delete_many()
            .filter(account_balance_daily::Column::BalanceDate.eq(business_date))
            .filter(
                account_balance_daily::Column::EntityCode
                    .is_in(entity_codes.iter().map(String::as_str)),
            )
            .exec(&txn)
            .await
            .map_err(persist_error)?;
        let trial = account_trial_balance::Entity::delete_many()
            .filter(account_trial_balance::Column::BalanceDate.eq(business_date))
            .filter(
                account_trial_balance::Column::EntityCode
                    .is_in(entity_codes.iter().map(String::as_str)),
            )
            .exec(&txn)
            .await
            .map_err(persist_error)?;
        txn.commit().await.map_err(persist_error)?;

        debug!(
            %business_date,
            account_rows = accounts.rows_affected,
            trial_balance_rows = trial.rows_affected,
            "Balances of the date cleared"
        );
        Ok(ClearedRows {
            account_rows: accounts.rows_affected,
            trial_balance_rows: trial.rows_affected,
        })
    }

    async fn insert_account_balances(&self, rows: &[AccountBalanceDaily]) -> Result<(), PersistError> {
        if rows.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await.map_err(persist_error)?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let now: DateTimeWithTimeZone = chrono::Utc::now().into();
            let models = chunk.iter().map(|row| account_balance_daily::ActiveModel {
                account_number: Set(row.account_number.clone()),
                balance_date: Set(row.balance_date),
                entity_code: Set(row.entity_code.clone()),
                category_code: Set(row.category_code.clone()),
                sub_category_code: Set(row.sub_category_code.clone()),
                opening_balance: Set(row.opening_balance),
                debit_movement: Set(row.debit_movement),
                credit_movement: Set(row.credit_movement),
                closing_balance: Set(row.closing_balance),
                updated_at: Set(now),
            });

            account_balance_daily::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        account_balance_daily::Column::AccountNumber,
                        account_balance_daily::Column::BalanceDate,
                    ])
                    .update_columns([
                        account_balance_daily::Column::EntityCode,
                        account_balance_daily::Column::CategoryCode,
                        account_balance_daily::Column::SubCategoryCode,
                        account_balance_daily::Column::OpeningBalance,
                        account_balance_daily::Column::DebitMovement,
                        account_balance_daily::Column::CreditMovement,
                        account_balance_daily::Column::ClosingBalance,
                        account_balance_daily::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(persist_error)?;
        }
        txn.commit().await.map_err(persist_error)?;

        debug!(rows = rows.len(), "Account balances upserted");
        Ok(())
    }

    async fn insert_trial_balances(&self, rows: &[AccountTrialBalance]) -> Result<(), PersistError> {
        if rows.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await.map_err(persist_error)?;
        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let now: DateTimeWithTimeZone = chrono::Utc::now().into();
            let models = chunk.iter().map(|row| account_trial_balance::ActiveModel {
                entity_code: Set(row.entity_code.clone()),
                sub_category_code: Set(row.sub_category_code.clone()),
                balance_date: Set(row.balance_date),
                opening_balance: Set(row.opening_balance),
                debit_movement: Set(row.debit_movement),
                credit_movement: Set(row.credit_movement),
                closing_balance: Set(row.closing_balance),
                account_count: Set(i64::try_from(row.account_count).unwrap_or(i64::MAX)),
                updated_at: Set(now),
            });

            account_trial_balance::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        account_trial_balance::Column::EntityCode,
                        account_trial_balance::Column::SubCategoryCode,
                        account_trial_balance::Column::BalanceDate,
                    ])
                    .update_columns([
                        account_trial_balance::Column::OpeningBalance,
                        account_trial_balance::Column::DebitMovement,
                        account_trial_balance::Column::CreditMovement,
                        account_trial_balance::Column::ClosingBalance,
                        account_trial_balance::Column::AccountCount,
                        account_trial_balance::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(persist_error)?;
        }
        txn.commit().await.map_err(persist_error)?;

        debug!(rows = rows.len(), "Trial balance upserted");
        Ok(())
    }
}
