//! Trial-balance accumulation per (entity, sub-category).

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::case::ComputedBalance;

const LENGTH_DELIMITER: char = ':';

/// Identifies one trial-balance group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrialBalanceKey {
    /// Entity code.
    pub entity_code: String,
    /// Sub-category code.
    pub sub_category_code: String,
}

impl TrialBalanceKey {
    /// Creates a key.
    #[must_use]
    pub fn new(entity_code: &str, sub_category_code: &str) -> Self {
        Self {
            entity_code: entity_code.to_string(),
            sub_category_code: sub_category_code.to_string(),
        }
    }

    /// Key under which the group is stored in the accumulator partition.
    ///
    /// The entity code is prefixed with its byte length (`2:E1S1`), so any
    /// pair of codes maps to a distinct key.
    #[must_use]
    pub fn staging_key(&self) -> String {
        format!(
            "{}{LENGTH_DELIMITER}{}{}",
            self.entity_code.len(),
            self.entity_code,
            self.sub_category_code
        )
    }

    /// Parses a staging key produced by [`Self::staging_key`].
    #[must_use]
    pub fn parse(staging_key: &str) -> Option<Self> {
        let (length, codes) = staging_key.split_once(LENGTH_DELIMITER)?;
        let length: usize = length.parse().ok()?;
        let entity_code = codes.get(..length)?;
        let sub_category_code = codes.get(length..)?;
        Some(Self::new(entity_code, sub_category_code))
    }
}

impl fmt::Display for TrialBalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_code, self.sub_category_code)
    }
}

/// Running totals of one trial-balance group.
///
/// `net_movement` is the sum of each account's signed movement under its own
/// sign rule, so `opening + net_movement` equals the sum of account closings
/// even when the group mixes asset and liability accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceTotals {
    /// Sum of opening balances.
    pub opening: Decimal,
    /// Sum of debit movements.
    pub debit: Decimal,
    /// Sum of credit movements.
    pub credit: Decimal,
    /// Sum of signed net movements.
    pub net_movement: Decimal,
    /// Number of accounts folded in.
    pub account_count: u64,
}

impl TrialBalanceTotals {
    /// Folds one computed account balance into the totals.
    pub fn add(&mut self, balance: &ComputedBalance) {
        self.opening += balance.opening;
        self.debit += balance.debit;
        self.credit += balance.credit;
        self.net_movement += balance.closing - balance.opening;
        self.account_count += 1;
    }

    /// Combines two partial totals of the same group.
    #[must_use]
    pub fn merge(self, other: &Self) -> Self {
        Self {
            opening: self.opening + other.opening,
            debit: self.debit + other.debit,
            credit: self.credit + other.credit,
            net_movement: self.net_movement + other.net_movement,
            account_count: self.account_count + other.account_count,
        }
    }

    /// Closing total of the group.
    #[must_use]
    pub fn closing(&self) -> Decimal {
        self.opening + self.net_movement
    }
}
