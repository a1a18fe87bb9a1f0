//! Trial-balance finalization.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::balance::{AccountTrialBalance, TrialBalanceKey, TrialBalanceTotals};
use crate::job::JobError;
use crate::persist::BalanceSink;
use crate::staging::{StagingError, StagingStore};

/// Counters of the finalization step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialBalanceStats {
    /// Rows written (entities × sub-categories).
    pub rows: u64,
    /// Rows backed by at least one account.
    pub populated: u64,
    /// Accumulated groups outside the entity × sub-category grid.
    pub outside_grid: u64,
}

/// Builds one row per allowed entity and known sub-category and persists
/// them in a single call.
///
/// Groups missing from the accumulator are written as zero rows. The write
/// is not retried.
pub async fn finalize_trial_balance<S: BalanceSink + ?Sized>(
    sink: &S,
    accumulator: &Arc<StagingStore<TrialBalanceTotals>>,
    entity_codes: &[String],
    sub_categories: &[String],
    business_date: NaiveDate,
) -> Result<TrialBalanceStats, JobError> {
    let store = Arc::clone(accumulator);
    let entity_codes = entity_codes.to_vec();
    let sub_categories = sub_categories.to_vec();

    let (rows, mut stats) = tokio::task::spawn_blocking(move || {
        build_rows(&store, &entity_codes, &sub_categories, business_date)
    })
    .await
    .map_err(|e| JobError::Task(format!("trial balance finalization: {e}")))??;

    if rows.is_empty() {
        warn!(%business_date, "No trial balance rows to write");
        return Ok(stats);
    }

    sink.insert_trial_balances(&rows).await?;
    stats.rows = rows.len() as u64;

    info!(
        %business_date,
        rows = stats.rows,
        populated = stats.populated,
        outside_grid = stats.outside_grid,
        "Trial balance finalized"
    );
    Ok(stats)
}

fn build_rows(
    store: &StagingStore<TrialBalanceTotals>,
    entity_codes: &[String],
    sub_categories: &[String],
    business_date: NaiveDate,
) -> Result<(Vec<AccountTrialBalance>, TrialBalanceStats), StagingError> {
    let mut stats = TrialBalanceStats::default();
    let mut rows = Vec::with_capacity(entity_codes.len() * sub_categories.len());

    for entity_code in entity_codes {
        for sub_category_code in sub_categories {
            let key = TrialBalanceKey::new(entity_code, sub_category_code);
            let totals = store.find(&key.staging_key())?.unwrap_or_default();
            if totals.account_count > 0 {
                stats.populated += 1;
            }
            rows.push(AccountTrialBalance::from_totals(&key, business_date, &totals));
        }
    }

    let entities: HashSet<&str> = entity_codes.iter().map(String::as_str).collect();
    let known: HashSet<&str> = sub_categories.iter().map(String::as_str).collect();
    store.for_each(|staging_key, totals: TrialBalanceTotals| {
        let inside = TrialBalanceKey::parse(staging_key).is_some_and(|key| {
            entities.contains(key.entity_code.as_str())
                && known.contains(key.sub_category_code.as_str())
        });
        if !inside {
            stats.outside_grid += 1;
            warn!(
                group = staging_key,
                accounts = totals.account_count,
                closing = %totals.closing(),
                "Accumulated group is outside the trial balance grid and will not be written"
            );
        }
        Ok::<_, StagingError>(())
    })?;

    Ok((rows, stats))
}
