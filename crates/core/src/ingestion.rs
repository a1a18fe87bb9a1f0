//! Concurrent ingestion of the three source streams into staging.
//!
//! Each stream is drained by its own task into its own partition, so the
//! writers never share a key space. The coordinator is a barrier: it returns
//! only after all three tasks have ended. The first failure cancels the
//! siblings and is the error reported.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::balance::{AccountRegistryEntry, MovementRecord, PriorBalanceRecord};
use crate::job::JobError;
use crate::source::{BalanceSource, RecordStream, SourceQuery};
use crate::staging::{ACCOUNTS, MOVEMENTS, PRIOR_BALANCES, StagingArea, StagingStore};

/// Default number of records written to staging per transaction.
pub const DEFAULT_WRITE_BATCH: usize = 500;

/// Ingestion settings.
#[derive(Debug, Clone, Copy)]
pub struct IngestionOptions {
    /// Drop movements whose debit and credit are both zero.
    pub skip_zero_movement: bool,
    /// Records buffered per staging transaction.
    pub write_batch: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            skip_zero_movement: true,
            write_batch: DEFAULT_WRITE_BATCH,
        }
    }
}

/// Records staged per partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Movement records staged (duplicates included).
    pub movements: u64,
    /// Prior balance records staged.
    pub prior_balances: u64,
    /// Registry entries staged.
    pub accounts: u64,
    /// All-zero movements dropped by the filter.
    pub zero_movements_skipped: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct DrainStats {
    staged: u64,
    skipped: u64,
}

/// Records staged under their account number.
trait AccountKeyed {
    fn account_key(&self) -> String;
}

impl AccountKeyed for MovementRecord {
    fn account_key(&self) -> String {
        self.account_number.clone()
    }
}

impl AccountKeyed for PriorBalanceRecord {
    fn account_key(&self) -> String {
        self.account_number.clone()
    }
}

impl AccountKeyed for AccountRegistryEntry {
    fn account_key(&self) -> String {
        self.account_number.clone()
    }
}

/// How one stream lands in its partition.
struct Drain<V> {
    partition: &'static str,
    store: Arc<StagingStore<V>>,
    keep: fn(&V) -> bool,
    merge: fn(V, V) -> V,
}

impl<V> Drain<V>
where
    V: AccountKeyed + Serialize + DeserializeOwned + Send + 'static,
{
    async fn run(
        self,
        mut stream: RecordStream<V>,
        cancel: CancellationToken,
        write_batch: usize,
    ) -> Result<DrainStats, JobError> {
        let mut stats = DrainStats::default();
        let mut buffer = Vec::with_capacity(write_batch);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(JobError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(record)) => {
                    if !(self.keep)(&record) {
                        stats.skipped += 1;
                        continue;
                    }
                    buffer.push((record.account_key(), record));
                    if buffer.len() >= write_batch {
                        let full = std::mem::replace(&mut buffer, Vec::with_capacity(write_batch));
                        stats.staged += self.write(full).await?;
                    }
                }
                Some(Err(source)) => {
                    return Err(JobError::Source {
                        partition: self.partition,
                        source,
                    });
                }
                None => break,
            }
        }

        stats.staged += self.write(buffer).await?;
        Ok(stats)
    }

    async fn write(&self, entries: Vec<(String, V)>) -> Result<u64, JobError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let store = Arc::clone(&self.store);
        let merge = self.merge;
        let written = tokio::task::spawn_blocking(move || store.upsert_batch(entries, merge))
            .await
            .map_err(|e| JobError::Task(format!("{} staging writer: {e}", self.partition)))??;
        Ok(written as u64)
    }
}

fn keep_all<V>(_: &V) -> bool {
    true
}

fn keep_nonzero(movement: &MovementRecord) -> bool {
    !movement.is_zero()
}

fn sum_movements(existing: MovementRecord, incoming: MovementRecord) -> MovementRecord {
    existing.merge(&incoming)
}

fn replace<V>(_existing: V, incoming: V) -> V {
    incoming
}

/// Drains the three source streams into the staging area.
///
/// Movements for the same account are summed; for prior balances and
/// registry entries the last record seen wins.
pub async fn ingest<S>(
    source: &S,
    query: &SourceQuery,
    area: &StagingArea,
    options: IngestionOptions,
    cancel: &CancellationToken,
) -> Result<IngestionStats, JobError>
where
    S: BalanceSource + ?Sized,
{
    let cancel = cancel.child_token();
    let write_batch = options.write_batch.max(1);
    let mut tasks = JoinSet::new();

    let keep_movement: fn(&MovementRecord) -> bool = if options.skip_zero_movement {
        keep_nonzero
    } else {
        keep_all
    };
    let movements = Drain {
        partition: MOVEMENTS,
        store: Arc::clone(area.movements()),
        keep: keep_movement,
        merge: sum_movements,
    };
    let prior_balances: Drain<PriorBalanceRecord> = Drain {
        partition: PRIOR_BALANCES,
        store: Arc::clone(area.prior_balances()),
        keep: keep_all,
        merge: replace,
    };
    let accounts: Drain<AccountRegistryEntry> = Drain {
        partition: ACCOUNTS,
        store: Arc::clone(area.accounts()),
        keep: keep_all,
        merge: replace,
    };

    let stream = source.movements(query);
    let token = cancel.clone();
    tasks.spawn(async move { (MOVEMENTS, movements.run(stream, token, write_batch).await) });

    let stream = source.prior_balances(query);
    let token = cancel.clone();
    tasks.spawn(async move {
        (
            PRIOR_BALANCES,
            prior_balances.run(stream, token, write_batch).await,
        )
    });

    let stream = source.accounts(query);
    let token = cancel.clone();
    tasks.spawn(async move { (ACCOUNTS, accounts.run(stream, token, write_batch).await) });

    let mut stats = IngestionStats::default();
    let mut first_error: Option<JobError> = None;

    while let Some(joined) = tasks.join_next().await {
        let (partition, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                cancel.cancel();
                first_error.get_or_insert(JobError::Task(format!("ingestion task: {e}")));
                continue;
            }
        };

        match result {
            Ok(drained) => {
                debug!(partition, staged = drained.staged, "Stream drained");
                match partition {
                    MOVEMENTS => {
                        stats.movements = drained.staged;
                        stats.zero_movements_skipped = drained.skipped;
                    }
                    PRIOR_BALANCES => stats.prior_balances = drained.staged,
                    _ => stats.accounts = drained.staged,
                }
            }
            // A sibling stopping because of an earlier failure.
            Err(JobError::Cancelled) if first_error.is_some() => {}
            Err(e) => {
                if first_error.is_none() {
                    warn!(partition, error = %e, "Ingestion failed, cancelling remaining streams");
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    info!(
        movements = stats.movements,
        prior_balances = stats.prior_balances,
        accounts = stats.accounts,
        zero_movements_skipped = stats.zero_movements_skipped,
        "Ingestion complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use crate::testing::{MemorySource, account, movement, prior};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn query() -> SourceQuery {
        SourceQuery {
            business_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            entity_codes: vec!["E1".to_string()],
            sub_categories: vec!["S1".to_string()],
        }
    }

    fn options(skip_zero_movement: bool) -> IngestionOptions {
        IngestionOptions {
            skip_zero_movement,
            write_batch: 2,
        }
    }

    #[tokio::test]
    async fn test_stages_all_three_partitions() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::open(Some(parent.path())).unwrap();
        let source = MemorySource {
            movements: vec![
                movement("A", dec!(10), dec!(0)),
                movement("B", dec!(0), dec!(0)),
                movement("A", dec!(10), dec!(5)),
                movement("C", dec!(1), dec!(1)),
            ],
            priors: vec![prior("A", dec!(100)), prior("A", dec!(90))],
            accounts: vec![account("A", "E1", "S1"), account("B", "E1", "S1")],
            ..MemorySource::default()
        };

        let stats = ingest(&source, &query(), &area, options(true), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            stats,
            IngestionStats {
                movements: 3,
                prior_balances: 2,
                accounts: 2,
                zero_movements_skipped: 1,
            }
        );

        let a = area.movements().get("A").unwrap();
        assert_eq!(a.debit, dec!(20));
        assert_eq!(a.credit, dec!(5));
        assert!(area.movements().find("B").unwrap().is_none());
        assert_eq!(
            area.prior_balances().get("A").unwrap().closing_balance,
            dec!(90)
        );
        assert_eq!(area.accounts().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_movements_kept_when_filter_disabled() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::open(Some(parent.path())).unwrap();
        let source = MemorySource {
            movements: vec![movement("B", dec!(0), dec!(0))],
            ..MemorySource::default()
        };

        let stats = ingest(&source, &query(), &area, options(false), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.movements, 1);
        assert_eq!(stats.zero_movements_skipped, 0);
        assert!(area.movements().find("B").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stream_error_cancels_siblings() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::open(Some(parent.path())).unwrap();
        let source = MemorySource {
            movements: vec![movement("A", dec!(1), dec!(0))],
            movement_error: Some("connection reset".to_string()),
            accounts_never_end: true,
            ..MemorySource::default()
        };

        let err = ingest(&source, &query(), &area, options(true), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::Source {
                partition: MOVEMENTS,
                source: SourceError::Query(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_ingestion() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::open(Some(parent.path())).unwrap();
        let source = MemorySource {
            accounts_never_end: true,
            ..MemorySource::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ingest(&source, &query(), &area, options(true), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Cancelled));
    }
}
