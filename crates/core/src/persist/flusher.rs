//! Sequential or bounded-concurrent flushing of account balance batches.

use std::sync::Arc;

use daybook_shared::PersistMode;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

use super::retry::RetryingSink;
use super::sink::{BalanceSink, PersistError};
use crate::balance::AccountBalanceDaily;

/// Totals of what a flusher persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Batches written.
    pub batches: u64,
    /// Rows written.
    pub rows: u64,
}

/// Hands batches to the retrying sink.
///
/// In [`PersistMode::Sequential`] each batch is written before `submit`
/// returns, so batches land in visit order. In [`PersistMode::Concurrent`]
/// batches are written by background tasks, at most `max_in_flight` at a
/// time; `submit` waits for a free slot. [`BatchFlusher::finish`] joins
/// everything. The first failure is returned and dropping the flusher
/// aborts whatever is still in flight.
pub struct BatchFlusher<S> {
    sink: RetryingSink<S>,
    mode: PersistMode,
    slots: Arc<Semaphore>,
    in_flight: JoinSet<Result<usize, PersistError>>,
    stats: FlushStats,
}

impl<S: BalanceSink> BatchFlusher<S> {
    /// Creates a flusher.
    #[must_use]
    pub fn new(sink: RetryingSink<S>, mode: PersistMode, max_in_flight: usize) -> Self {
        Self {
            sink,
            mode,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight: JoinSet::new(),
            stats: FlushStats::default(),
        }
    }

    /// Persistence mode.
    #[must_use]
    pub fn mode(&self) -> PersistMode {
        self.mode
    }

    /// Submits one batch. Empty batches are ignored.
    pub async fn submit(&mut self, batch: Vec<AccountBalanceDaily>) -> Result<(), PersistError> {
        if batch.is_empty() {
            return Ok(());
        }

        match self.mode {
            PersistMode::Sequential => {
                self.sink.insert_account_balances(&batch).await?;
                self.record(batch.len());
            }
            PersistMode::Concurrent => {
                self.reap()?;
                let slot = Arc::clone(&self.slots)
                    .acquire_owned()
                    .await
                    .map_err(|_| PersistError::Cancelled)?;
                let sink = self.sink.clone();
                debug!(rows = batch.len(), in_flight = self.in_flight.len() + 1, "Batch spawned");
                self.in_flight.spawn(async move {
                    let _slot = slot;
                    sink.insert_account_balances(&batch).await.map(|()| batch.len())
                });
            }
        }
        Ok(())
    }

    /// Waits for every in-flight batch and returns the totals.
    pub async fn finish(mut self) -> Result<FlushStats, PersistError> {
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = self.absorb(joined) {
                self.in_flight.abort_all();
                return Err(e);
            }
        }
        Ok(self.stats)
    }

    fn reap(&mut self) -> Result<(), PersistError> {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.absorb(joined)?;
        }
        Ok(())
    }

    fn absorb(
        &mut self,
        joined: Result<Result<usize, PersistError>, JoinError>,
    ) -> Result<(), PersistError> {
        let rows = joined.map_err(|e| PersistError::Task(e.to_string()))??;
        self.record(rows);
        Ok(())
    }

    fn record(&mut self, rows: usize) {
        self.stats.batches += 1;
        self.stats.rows += rows as u64;
    }
}
