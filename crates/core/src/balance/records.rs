//! Staged source records and persisted output rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::coa::CoaType;
use super::trial::{TrialBalanceKey, TrialBalanceTotals};

/// Accumulated debit/credit movement of one account for the business date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Account number.
    pub account_number: String,
    /// Sum of debit amounts.
    pub debit: Decimal,
    /// Sum of credit amounts.
    pub credit: Decimal,
}

impl MovementRecord {
    /// Returns true if both sides are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.debit.is_zero() && self.credit.is_zero()
    }

    /// Adds another movement for the same account.
    #[must_use]
    pub fn merge(self, other: &Self) -> Self {
        Self {
            account_number: self.account_number,
            debit: self.debit + other.debit,
            credit: self.credit + other.credit,
        }
    }
}

/// Closing balance of one account on the previous business date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorBalanceRecord {
    /// Account number.
    pub account_number: String,
    /// Previous closing balance.
    pub closing_balance: Decimal,
    /// Entity code at the time of the prior balance.
    pub entity_code: String,
    /// Category code.
    pub category_code: String,
    /// Sub-category code.
    pub sub_category_code: String,
}

/// One account of the registry. The registry defines which accounts are visited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRegistryEntry {
    /// Account number.
    pub account_number: String,
    /// Owning entity.
    pub entity_code: String,
    /// Category code.
    pub category_code: String,
    /// Sub-category code, the trial-balance granularity.
    pub sub_category_code: String,
    /// Chart-of-account type carried by the account itself, if any.
    #[serde(default)]
    pub coa_type: Option<CoaType>,
}

impl AccountRegistryEntry {
    /// Trial-balance group this account rolls up into.
    #[must_use]
    pub fn trial_balance_key(&self) -> TrialBalanceKey {
        TrialBalanceKey::new(&self.entity_code, &self.sub_category_code)
    }
}

/// Computed balance of one account for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalanceDaily {
    /// Account number.
    pub account_number: String,
    /// Business date the balance belongs to.
    pub balance_date: NaiveDate,
    /// Owning entity.
    pub entity_code: String,
    /// Category code.
    pub category_code: String,
    /// Sub-category code.
    pub sub_category_code: String,
    /// Balance before the day's movement.
    pub opening_balance: Decimal,
    /// Debit movement for the day.
    pub debit_movement: Decimal,
    /// Credit movement for the day.
    pub credit_movement: Decimal,
    /// Balance after the day's movement.
    pub closing_balance: Decimal,
}

/// Finalized totals of one (entity, sub-category) group for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTrialBalance {
    /// Entity code.
    pub entity_code: String,
    /// Sub-category code.
    pub sub_category_code: String,
    /// Business date.
    pub balance_date: NaiveDate,
    /// Sum of account opening balances.
    pub opening_balance: Decimal,
    /// Sum of account debit movements.
    pub debit_movement: Decimal,
    /// Sum of account credit movements.
    pub credit_movement: Decimal,
    /// Sum of account closing balances.
    pub closing_balance: Decimal,
    /// Number of accounts that produced a row in this group.
    pub account_count: u64,
}

impl AccountTrialBalance {
    /// Builds the persisted row for a group from its accumulated totals.
    #[must_use]
    pub fn from_totals(
        key: &TrialBalanceKey,
        balance_date: NaiveDate,
        totals: &TrialBalanceTotals,
    ) -> Self {
        Self {
            entity_code: key.entity_code.clone(),
            sub_category_code: key.sub_category_code.clone(),
            balance_date,
            opening_balance: totals.opening,
            debit_movement: totals.debit,
            credit_movement: totals.credit,
            closing_balance: totals.closing(),
            account_count: totals.account_count,
        }
    }
}
