//! Run-scoped, disk-backed staging.
//!
//! Source records are staged out of core so a run never needs the full
//! movement, prior-balance, or registry set in memory. Each partition is a
//! single-file SQLite database in a private temporary directory that is
//! removed when the run releases it.

mod area;
mod error;
mod store;

pub use area::{ACCOUNTS, MOVEMENTS, PRIOR_BALANCES, ReleaseReport, StagingArea, TRIAL_BALANCE};
pub use error::StagingError;
pub use store::StagingStore;
