//! Source streams and reference data consumed by a run.
//!
//! The db crate implements these traits against PostgreSQL; tests use
//! in-memory fakes.

use chrono::NaiveDate;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::balance::{AccountRegistryEntry, CoaTypeMap, MovementRecord, PriorBalanceRecord};

/// Lazy, single-pass stream of source records.
pub type RecordStream<T> = BoxStream<'static, Result<T, SourceError>>;

/// Scope of one run's source queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    /// Business date being computed.
    pub business_date: NaiveDate,
    /// Entities whose accounts are in scope.
    pub entity_codes: Vec<String>,
    /// Sub-categories in scope.
    pub sub_categories: Vec<String>,
}

impl SourceQuery {
    /// Date whose closing balances open `business_date`: the previous calendar day.
    #[must_use]
    pub fn prior_date(&self) -> Option<NaiveDate> {
        self.business_date.pred_opt()
    }
}

/// Errors raised while reading source data.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A query against the source failed.
    #[error("Source query failed: {0}")]
    Query(String),

    /// A row could not be turned into a record.
    #[error("Invalid source record: {0}")]
    InvalidRecord(String),

    /// The source could not be reached.
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Returns the error code used in logs and notifications.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Query(_) => "SOURCE_QUERY_FAILED",
            Self::InvalidRecord(_) => "SOURCE_INVALID_RECORD",
            Self::Unavailable(_) => "SOURCE_UNAVAILABLE",
        }
    }

    /// Returns true if rerunning the job may succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The three record streams a run ingests.
///
/// Each call starts a fresh query; streams are lazy and end when exhausted.
pub trait BalanceSource: Send + Sync {
    /// Debit/credit movements on `query.business_date`, summed per account.
    fn movements(&self, query: &SourceQuery) -> RecordStream<MovementRecord>;

    /// Closing balances of the prior business date.
    fn prior_balances(&self, query: &SourceQuery) -> RecordStream<PriorBalanceRecord>;

    /// Every account of the in-scope entities and sub-categories.
    fn accounts(&self, query: &SourceQuery) -> RecordStream<AccountRegistryEntry>;
}

/// Chart-of-account reference data loaded before ingestion.
pub trait ChartOfAccounts: Send + Sync {
    /// Sub-category → chart-of-account type mapping.
    fn coa_types(&self) -> impl std::future::Future<Output = Result<CoaTypeMap, SourceError>> + Send;

    /// Every known sub-category code.
    fn sub_categories(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<String>, SourceError>> + Send;
}
