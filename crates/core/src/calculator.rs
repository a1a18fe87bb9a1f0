//! Single-threaded traversal of the account registry.
//!
//! Each registry page is resolved on a blocking thread: prior balance and
//! movement are looked up per account, the four-case merge and sign rule
//! give the account's figures, and the page's per-group totals are merged
//! into the trial-balance partition. Rows are then handed to the flusher in
//! visit order, one chunk at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::balance::{
    AccountBalanceDaily, AccountRegistryEntry, BalanceCase, CaseKind, ClassSource, CoaTypeMap,
    MovementRecord, PriorBalanceRecord, TrialBalanceTotals,
};
use crate::job::JobError;
use crate::persist::{BalanceSink, BatchFlusher};
use crate::staging::{StagingArea, StagingError, StagingStore};

/// Counters of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Registry entries visited.
    pub accounts_visited: u64,
    /// Accounts with neither prior balance nor movement.
    pub dormant: u64,
    /// Accounts with a prior balance only.
    pub carried_forward: u64,
    /// Accounts with a movement only.
    pub movement_only: u64,
    /// Accounts with both.
    pub posted: u64,
    /// Accounts whose class fell back to debit-normal.
    pub unclassified: u64,
    /// Rows produced.
    pub rows: u64,
    /// Batches submitted.
    pub batches: u64,
}

impl CalculationStats {
    fn count(&mut self, kind: CaseKind) {
        match kind {
            CaseKind::Dormant => self.dormant += 1,
            CaseKind::CarriedForward => self.carried_forward += 1,
            CaseKind::MovementOnly => self.movement_only += 1,
            CaseKind::Posted => self.posted += 1,
        }
    }

    fn absorb(&mut self, page: &Self) {
        self.accounts_visited += page.accounts_visited;
        self.dormant += page.dormant;
        self.carried_forward += page.carried_forward;
        self.movement_only += page.movement_only;
        self.posted += page.posted;
        self.unclassified += page.unclassified;
    }
}

struct Page {
    last_key: Option<String>,
    rows: Vec<AccountBalanceDaily>,
    stats: CalculationStats,
}

/// Computes per-account balances from a staged run.
pub struct BalanceCalculator {
    accounts: Arc<StagingStore<AccountRegistryEntry>>,
    prior_balances: Arc<StagingStore<PriorBalanceRecord>>,
    movements: Arc<StagingStore<MovementRecord>>,
    trial_balance: Arc<StagingStore<TrialBalanceTotals>>,
    coa_types: Arc<CoaTypeMap>,
    business_date: NaiveDate,
    chunk_size: usize,
    page_size: usize,
}

impl BalanceCalculator {
    /// Creates a calculator over `area`.
    #[must_use]
    pub fn new(
        area: &StagingArea,
        coa_types: Arc<CoaTypeMap>,
        business_date: NaiveDate,
        chunk_size: usize,
        page_size: usize,
    ) -> Self {
        Self {
            accounts: Arc::clone(area.accounts()),
            prior_balances: Arc::clone(area.prior_balances()),
            movements: Arc::clone(area.movements()),
            trial_balance: Arc::clone(area.trial_balance()),
            coa_types,
            business_date,
            chunk_size: chunk_size.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Visits every registry entry, submitting rows to `flusher` in chunks.
    pub async fn run<S: BalanceSink>(
        &self,
        flusher: &mut BatchFlusher<S>,
    ) -> Result<CalculationStats, JobError> {
        let mut stats = CalculationStats::default();
        let mut batch = Vec::with_capacity(self.chunk_size);
        let mut after: Option<String> = None;

        loop {
            let page = self.next_page(after.take()).await?;
            let Some(last_key) = page.last_key else {
                break;
            };
            stats.absorb(&page.stats);

            for row in page.rows {
                batch.push(row);
                if batch.len() >= self.chunk_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(self.chunk_size));
                    stats.rows += full.len() as u64;
                    stats.batches += 1;
                    flusher.submit(full).await?;
                }
            }
            after = Some(last_key);
        }

        if !batch.is_empty() {
            stats.rows += batch.len() as u64;
            stats.batches += 1;
            flusher.submit(batch).await?;
        }

        if stats.unclassified > 0 {
            warn!(
                accounts = stats.unclassified,
                "Accounts without a chart-of-account type were treated as debit-normal"
            );
        }
        info!(
            visited = stats.accounts_visited,
            dormant = stats.dormant,
            carried_forward = stats.carried_forward,
            movement_only = stats.movement_only,
            posted = stats.posted,
            rows = stats.rows,
            batches = stats.batches,
            "Balance calculation complete"
        );
        Ok(stats)
    }

    async fn next_page(&self, after: Option<String>) -> Result<Page, JobError> {
        let accounts = Arc::clone(&self.accounts);
        let prior_balances = Arc::clone(&self.prior_balances);
        let movements = Arc::clone(&self.movements);
        let trial_balance = Arc::clone(&self.trial_balance);
        let coa_types = Arc::clone(&self.coa_types);
        let business_date = self.business_date;
        let page_size = self.page_size;

        let page = tokio::task::spawn_blocking(move || {
            resolve_page(
                &accounts,
                &prior_balances,
                &movements,
                &trial_balance,
                &coa_types,
                business_date,
                after.as_deref(),
                page_size,
            )
        })
        .await
        .map_err(|e| JobError::Task(format!("balance calculation: {e}")))??;

        Ok(page)
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_page(
    accounts: &StagingStore<AccountRegistryEntry>,
    prior_balances: &StagingStore<PriorBalanceRecord>,
    movements: &StagingStore<MovementRecord>,
    trial_balance: &StagingStore<TrialBalanceTotals>,
    coa_types: &CoaTypeMap,
    business_date: NaiveDate,
    after: Option<&str>,
    page_size: usize,
) -> Result<Page, StagingError> {
    let entries = accounts.page_after(after, page_size)?;
    let mut page = Page {
        last_key: entries.last().map(|(key, _)| key.clone()),
        rows: Vec::with_capacity(entries.len()),
        stats: CalculationStats::default(),
    };
    let mut groups: BTreeMap<String, TrialBalanceTotals> = BTreeMap::new();

    for (key, entry) in entries {
        page.stats.accounts_visited += 1;

        let case = BalanceCase::resolve(prior_balances.find(&key)?, movements.find(&key)?);
        page.stats.count(case.kind());

        let (class, class_source) = coa_types.class_for(&entry);
        let Some(computed) = case.compute(class) else {
            continue;
        };
        if class_source == ClassSource::Fallback {
            page.stats.unclassified += 1;
            debug!(
                account = %entry.account_number,
                sub_category = %entry.sub_category_code,
                "No chart-of-account type, using debit-normal"
            );
        }

        groups
            .entry(entry.trial_balance_key().staging_key())
            .or_default()
            .add(&computed);
        page.rows.push(computed.into_daily(&entry, business_date));
    }

    trial_balance.upsert_batch(groups.into_iter().collect(), |existing, incoming| {
        existing.merge(&incoming)
    })?;

    Ok(page)
}
