//! The four run-scoped staging partitions and their shared directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, warn};

use super::error::StagingError;
use super::store::StagingStore;
use crate::balance::{AccountRegistryEntry, MovementRecord, PriorBalanceRecord, TrialBalanceTotals};

/// Partition holding accumulated movements, keyed by account number.
pub const MOVEMENTS: &str = "movements";
/// Partition holding prior-day balances, keyed by account number.
pub const PRIOR_BALANCES: &str = "prior_balances";
/// Partition holding the account registry, keyed by account number.
pub const ACCOUNTS: &str = "accounts";
/// Partition holding trial-balance totals, keyed by entity and sub-category.
pub const TRIAL_BALANCE: &str = "trial_balance";

/// Outcome of releasing a staging area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Stores closed and cleaned by this release.
    pub stores_released: usize,
}

/// Owns every staging store of one run.
///
/// Stores live in a private temporary directory. [`StagingArea::release`]
/// closes and cleans each store once and removes the directory; dropping an
/// unreleased area does the same.
#[derive(Debug)]
pub struct StagingArea {
    movements: Arc<StagingStore<MovementRecord>>,
    prior_balances: Arc<StagingStore<PriorBalanceRecord>>,
    accounts: Arc<StagingStore<AccountRegistryEntry>>,
    trial_balance: Arc<StagingStore<TrialBalanceTotals>>,
    path: PathBuf,
    dir: Option<TempDir>,
}

impl StagingArea {
    /// Creates a fresh staging directory under `parent` (system temp if `None`)
    /// and opens the four partitions in it.
    pub fn open(parent: Option<&Path>) -> Result<Self, StagingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("daybook-staging-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();

        let area = Self {
            movements: Arc::new(StagingStore::open(&path, MOVEMENTS)?),
            prior_balances: Arc::new(StagingStore::open(&path, PRIOR_BALANCES)?),
            accounts: Arc::new(StagingStore::open(&path, ACCOUNTS)?),
            trial_balance: Arc::new(StagingStore::open(&path, TRIAL_BALANCE)?),
            path,
            dir: Some(dir),
        };

        debug!(path = %area.path.display(), "Staging area opened");
        Ok(area)
    }

    /// Movement partition.
    #[must_use]
    pub fn movements(&self) -> &Arc<StagingStore<MovementRecord>> {
        &self.movements
    }

    /// Prior-balance partition.
    #[must_use]
    pub fn prior_balances(&self) -> &Arc<StagingStore<PriorBalanceRecord>> {
        &self.prior_balances
    }

    /// Account registry partition.
    #[must_use]
    pub fn accounts(&self) -> &Arc<StagingStore<AccountRegistryEntry>> {
        &self.accounts
    }

    /// Trial-balance accumulator partition.
    #[must_use]
    pub fn trial_balance(&self) -> &Arc<StagingStore<TrialBalanceTotals>> {
        &self.trial_balance
    }

    /// Staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the area has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Closes and cleans every store, then removes the directory.
    ///
    /// Every store is attempted even if an earlier one fails; the first error
    /// is returned. Releasing twice is a no-op.
    pub fn release(&mut self) -> Result<ReleaseReport, StagingError> {
        let Some(dir) = self.dir.take() else {
            return Ok(ReleaseReport::default());
        };

        let mut report = ReleaseReport::default();
        let mut first_error = None;

        let results = [
            self.movements.clean(),
            self.prior_balances.clean(),
            self.accounts.clean(),
            self.trial_balance.clean(),
        ];
        for result in results {
            match result {
                Ok(true) => report.stores_released += 1,
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = dir.close() {
            first_error.get_or_insert(StagingError::Io(e));
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(
                    path = %self.path.display(),
                    stores = report.stores_released,
                    "Staging area released"
                );
                Ok(report)
            }
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!(path = %self.path.display(), "Staging area dropped without release");
            if let Err(e) = self.release() {
                warn!(error = %e, "Failed to release staging area on drop");
            }
        }
    }
}
