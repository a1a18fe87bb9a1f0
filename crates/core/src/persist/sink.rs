//! Destination for computed balances.

use chrono::NaiveDate;
use thiserror::Error;

use crate::balance::{AccountBalanceDaily, AccountTrialBalance};

/// Errors raised while persisting balances.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Transient contention (deadlock, serialization failure). Safe to retry.
    #[error("Write conflict ({code}): {message}")]
    WriteConflict {
        /// Driver error code, e.g. a SQLSTATE.
        code: String,
        /// Driver message.
        message: String,
    },

    /// Any other write failure.
    #[error("Write failed: {0}")]
    Write(String),

    /// Every attempt ended in a write conflict.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        #[source]
        last: Box<PersistError>,
    },

    /// The run was cancelled while waiting to retry or to flush.
    #[error("Persistence cancelled")]
    Cancelled,

    /// A background flush task panicked or was aborted.
    #[error("Flush task failed: {0}")]
    Task(String),
}

impl PersistError {
    /// Returns true if the failed write may succeed when attempted again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }

    /// Returns the error code used in logs and notifications.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WriteConflict { .. } => "WRITE_CONFLICT",
            Self::Write(_) => "WRITE_FAILED",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::Cancelled => "PERSIST_CANCELLED",
            Self::Task(_) => "FLUSH_TASK_FAILED",
        }
    }
}

/// Rows removed by [`BalanceSink::clear_balances`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedRows {
    /// Account balance rows deleted.
    pub account_rows: u64,
    /// Trial balance rows deleted.
    pub trial_balance_rows: u64,
}

/// Durable storage for computed balances.
///
/// Implemented by the db crate. Writes must be upserts so a rerun for the
/// same date supersedes earlier rows; rows a rerun no longer produces are
/// removed up front by [`BalanceSink::clear_balances`].
pub trait BalanceSink: Send + Sync + 'static {
    /// Deletes account and trial balance rows of `business_date` for the
    /// given entities, in one transaction.
    fn clear_balances(
        &self,
        business_date: NaiveDate,
        entity_codes: &[String],
    ) -> impl std::future::Future<Output = Result<ClearedRows, PersistError>> + Send;

    /// Writes one batch of account balance rows.
    fn insert_account_balances(
        &self,
        rows: &[AccountBalanceDaily],
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send;

    /// Writes the finalized trial-balance rows.
    fn insert_trial_balances(
        &self,
        rows: &[AccountTrialBalance],
    ) -> impl std::future::Future<Output = Result<(), PersistError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_transient() {
        let conflict = PersistError::WriteConflict {
            code: "40P01".to_string(),
            message: "deadlock detected".to_string(),
        };
        assert!(conflict.is_transient());
        assert!(!PersistError::Write("unique violation".into()).is_transient());

        let exhausted = PersistError::RetriesExhausted {
            attempts: 3,
            last: Box::new(conflict),
        };
        assert!(!exhausted.is_transient());
        assert_eq!(exhausted.error_code(), "RETRIES_EXHAUSTED");
        assert_eq!(
            exhausted.to_string(),
            "Retries exhausted after 3 attempts: Write conflict (40P01): deadlock detected"
        );
    }
}
