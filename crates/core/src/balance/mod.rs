//! Balance domain: sign conventions, records, and per-account resolution.
//!
//! This module implements the pure part of the daily balance run:
//! - Chart-of-account classes and their closing-balance sign rules
//! - Staged source records and persisted output rows
//! - The four-case merge of prior balance and movement per account
//! - Trial-balance accumulation per (entity, sub-category)

pub mod case;
pub mod coa;
pub mod records;
pub mod trial;

#[cfg(test)]
mod props;

pub use case::{BalanceCase, CaseKind, ComputedBalance};
pub use coa::{ClassSource, CoaType, CoaTypeMap};
pub use records::{
    AccountBalanceDaily, AccountRegistryEntry, AccountTrialBalance, MovementRecord,
    PriorBalanceRecord,
};
pub use trial::{TrialBalanceKey, TrialBalanceTotals};
