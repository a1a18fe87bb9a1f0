//! Core batch logic for Daybook.
//!
//! This crate holds the daily balance job with no database dependencies.
//! Source data, the chart-of-account catalog, persistence, and operator
//! notifications are reached through traits implemented by `daybook-db`
//! and the job binary.
//!
//! # Modules
//!
//! - `balance` - Balance records, case resolution, and sign rules
//! - `staging` - Disk-backed keyed stores scoped to one run
//! - `source` - Source streams and reference data seams
//! - `ingestion` - Concurrent staging of the three source streams
//! - `calculator` - Registry traversal and per-account balance computation
//! - `persist` - Batched persistence with retry on write conflicts
//! - `trial_balance` - Trial balance finalization
//! - `notify` - Operator notification seam
//! - `job` - Orchestration of a full run

pub mod balance;
pub mod calculator;
pub mod ingestion;
pub mod job;
pub mod notify;
pub mod persist;
pub mod source;
pub mod staging;
pub mod trial_balance;

#[cfg(test)]
pub(crate) mod testing;

pub use job::{DailyBalanceJob, JobError, JobSettings, JobSummary, OPERATION};
