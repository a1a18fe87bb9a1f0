//! Daily balance job orchestration.
//!
//! A run for one business date goes through these steps in order:
//! 1. Load the chart-of-account mapping and the sub-category list
//! 2. Ingest the three source streams into a fresh staging area
//! 3. Delete balances a previous run wrote for the date and entities
//! 4. Traverse the registry, computing and flushing account balances
//! 5. Finalize and persist the trial balance
//! 6. Release the staging area, whatever the outcome
//!
//! Start, progress, and outcome are reported to the operator channel on a
//! best-effort basis.

mod error;


pub use error::JobError;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use daybook_shared::{FeatureFlags, JobConfig, PersistMode};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::balance::CoaTypeMap;
use crate::calculator::{BalanceCalculator, CalculationStats};
use crate::ingestion::{self, IngestionOptions, IngestionStats};
use crate::notify::Notifier;
use crate::persist::{
    BalanceSink, BatchFlusher, ClearedRows, FlushStats, Jitter, RandomJitter, RetryPolicy,
    RetryingSink,
};
use crate::source::{BalanceSource, ChartOfAccounts, SourceQuery};
use crate::staging::{ReleaseReport, StagingArea};
use crate::trial_balance::{self, TrialBalanceStats};

/// Operation name used in operator notifications.
pub const OPERATION: &str = "daily_balance";

/// Resolved settings of a run.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Entities computed.
    pub entity_codes: Vec<String>,
    /// Account rows per persistence batch.
    pub chunk_size: usize,
    /// Sequential or concurrent batch persistence.
    pub persist_mode: PersistMode,
    /// Upper bound on in-flight batches in concurrent mode.
    pub max_concurrent_flushes: usize,
    /// Drop all-zero movements during ingestion.
    pub skip_zero_movement: bool,
    /// Registry entries resolved per traversal step.
    pub traversal_page_size: usize,
    /// Parent directory of the staging area.
    pub staging_dir: Option<PathBuf>,
    /// Retry policy for account balance batches.
    pub retry: RetryPolicy,
}

impl JobSettings {
    /// Resolves settings from configuration; the chunk size may come from a
    /// feature-flag variant.
    pub fn from_config(config: &JobConfig, flags: &impl FeatureFlags) -> Self {
        Self {
            entity_codes: config.entity_codes.clone(),
            chunk_size: config.resolve_chunk_size(flags),
            persist_mode: config.persist_mode,
            max_concurrent_flushes: config.max_concurrent_flushes,
            skip_zero_movement: config.skip_zero_movement,
            traversal_page_size: config.traversal_page_size,
            staging_dir: config.staging_dir.clone(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    /// Business date computed.
    pub business_date: NaiveDate,
    /// Ingestion counters.
    pub ingestion: IngestionStats,
    /// Rows of an earlier run deleted before writing.
    pub cleared: ClearedRows,
    /// Traversal counters.
    pub calculation: CalculationStats,
    /// Account balance persistence counters.
    pub flushed: FlushStats,
    /// Trial balance counters.
    pub trial_balance: TrialBalanceStats,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Computes daily account balances and the trial balance for a date.
pub struct DailyBalanceJob<Src, Coa, Snk, N> {
    source: Src,
    catalog: Coa,
    sink: Arc<Snk>,
    notifier: N,
    settings: JobSettings,
    jitter: Arc<dyn Jitter>,
    cancel: CancellationToken,
    last_release: Mutex<Option<ReleaseReport>>,
}

impl<Src, Coa, Snk, N> DailyBalanceJob<Src, Coa, Snk, N>
where
    Src: BalanceSource,
    Coa: ChartOfAccounts,
    Snk: BalanceSink,
    N: Notifier,
{
    /// Creates a job.
    pub fn new(source: Src, catalog: Coa, sink: Arc<Snk>, notifier: N, settings: JobSettings) -> Self {
        Self {
            source,
            catalog,
            sink,
            notifier,
            settings,
            jitter: Arc::new(RandomJitter),
            cancel: CancellationToken::new(),
            last_release: Mutex::new(None),
        }
    }

    /// Uses `cancel` to abort ingestion and retry backoff.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the retry jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Settings in use.
    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Staging release of the most recent run that opened a staging area.
    pub fn last_release(&self) -> Option<ReleaseReport> {
        self.last_release.lock().ok().and_then(|released| *released)
    }

    /// Runs the job for `business_date`.
    ///
    /// The run is not atomic: batches flushed before a failure stay
    /// persisted. A rerun deletes the date's rows for the configured
    /// entities before writing, so it supersedes them.
    pub async fn run(&self, business_date: NaiveDate) -> Result<JobSummary, JobError> {
        let started = Instant::now();
        info!(
            %business_date,
            entities = ?self.settings.entity_codes,
            chunk_size = self.settings.chunk_size,
            persist_mode = ?self.settings.persist_mode,
            "Daily balance job started"
        );
        self.notify(&format!("Daily balance for {business_date} started"))
            .await;

        let mut result = self.execute(business_date).await;
        let elapsed = started.elapsed();

        match &mut result {
            Ok(summary) => {
                summary.elapsed = elapsed;
                info!(
                    %business_date,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    account_rows = summary.flushed.rows,
                    trial_balance_rows = summary.trial_balance.rows,
                    "Daily balance job finished"
                );
                self.notify(&format!(
                    "Daily balance for {business_date} completed in {elapsed:.1?}: {} account rows, {} trial balance rows",
                    summary.flushed.rows, summary.trial_balance.rows
                ))
                .await;
            }
            Err(e) => {
                error!(
                    %business_date,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    code = e.error_code(),
                    retryable = e.is_retryable(),
                    "Daily balance job failed"
                );
                self.notify(&format!(
                    "Daily balance for {business_date} failed after {elapsed:.1?}: {e}"
                ))
                .await;
            }
        }

        result
    }

    async fn execute(&self, business_date: NaiveDate) -> Result<JobSummary, JobError> {
        if self.settings.entity_codes.is_empty() {
            return Err(JobError::Configuration(
                "no entity codes configured".to_string(),
            ));
        }

        let coa_types = self
            .catalog
            .coa_types()
            .await
            .map_err(JobError::ReferenceData)?;
        let sub_categories = self
            .catalog
            .sub_categories()
            .await
            .map_err(JobError::ReferenceData)?;
        info!(
            coa_mappings = coa_types.len(),
            sub_categories = sub_categories.len(),
            "Reference data loaded"
        );

        let query = SourceQuery {
            business_date,
            entity_codes: self.settings.entity_codes.clone(),
            sub_categories,
        };

        let mut area = StagingArea::open(self.settings.staging_dir.as_deref())?;
        let outcome = self.process(&area, &query, Arc::new(coa_types)).await;
        let released = area.release();
        if let (Ok(report), Ok(mut last)) = (&released, self.last_release.lock()) {
            *last = Some(*report);
        }

        match (outcome, released) {
            (Ok(summary), Ok(_)) => Ok(summary),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!(error = %release_error, "Failed to release staging area after job failure");
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        area: &StagingArea,
        query: &SourceQuery,
        coa_types: Arc<CoaTypeMap>,
    ) -> Result<JobSummary, JobError> {
        let business_date = query.business_date;

        let ingestion = ingestion::ingest(
            &self.source,
            query,
            area,
            IngestionOptions {
                skip_zero_movement: self.settings.skip_zero_movement,
                ..IngestionOptions::default()
            },
            &self.cancel,
        )
        .await?;
        self.notify(&format!(
            "Daily balance for {business_date}: ingested {} movements, {} prior balances, {} accounts",
            ingestion.movements, ingestion.prior_balances, ingestion.accounts
        ))
        .await;

        let cleared = self
            .sink
            .clear_balances(business_date, &self.settings.entity_codes)
            .await?;
        info!(
            %business_date,
            account_rows = cleared.account_rows,
            trial_balance_rows = cleared.trial_balance_rows,
            "Previous balances cleared"
        );

        let retrying = RetryingSink::new(
            Arc::clone(&self.sink),
            self.settings.retry.clone(),
            self.cancel.clone(),
        )
        .with_jitter(Arc::clone(&self.jitter));
        let mut flusher = BatchFlusher::new(
            retrying,
            self.settings.persist_mode,
            self.settings.max_concurrent_flushes,
        );

        let calculation = BalanceCalculator::new(
            area,
            coa_types,
            business_date,
            self.settings.chunk_size,
            self.settings.traversal_page_size,
        )
        .run(&mut flusher)
        .await?;
        let flushed = flusher.finish().await?;

        let trial_balance = trial_balance::finalize_trial_balance(
            self.sink.as_ref(),
            area.trial_balance(),
            &self.settings.entity_codes,
            &query.sub_categories,
            business_date,
        )
        .await?;

        Ok(JobSummary {
            business_date,
            ingestion,
            cleared,
            calculation,
            flushed,
            trial_balance,
            elapsed: Duration::ZERO,
        })
    }

    async fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.notify(OPERATION, message).await {
            warn!(error = %e, code = e.error_code(), "Operator notification failed");
        }
    }
}
