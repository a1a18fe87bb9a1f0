//! Bounded retry with exponential backoff for account balance batches.

use std::sync::Arc;
use std::time::Duration;

use daybook_shared::RetryConfig;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::sink::{BalanceSink, PersistError};
use crate::balance::AccountBalanceDaily;

/// Source of the random component added to each backoff.
pub trait Jitter: Send + Sync {
    /// Returns a delay in `0..=max`.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Uniformly random jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

/// No jitter; makes retry timing deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn jitter(&self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

/// Retry policy for transient write conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; doubles each time.
    pub base_delay: Duration,
    /// Upper bound of the jitter added to every backoff.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Backoff after the failed attempt with zero-based index `attempt`:
    /// `base * 2^attempt + jitter`.
    #[must_use]
    pub fn backoff(&self, attempt: u32, jitter: &dyn Jitter) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .saturating_add(jitter.jitter(self.max_jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Wraps a sink so account balance batches survive transient write conflicts.
///
/// Non-transient errors are returned at once. After `max_attempts` conflicts
/// the last one is wrapped in [`PersistError::RetriesExhausted`]. Backoff
/// sleeps end early with [`PersistError::Cancelled`] when the token fires.
pub struct RetryingSink<S> {
    inner: Arc<S>,
    policy: RetryPolicy,
    jitter: Arc<dyn Jitter>,
    cancel: CancellationToken,
}

impl<S> Clone for RetryingSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy.clone(),
            jitter: Arc::clone(&self.jitter),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: BalanceSink> RetryingSink<S> {
    /// Creates a retrying sink with random jitter.
    #[must_use]
    pub fn new(inner: Arc<S>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            jitter: Arc::new(RandomJitter),
            cancel,
        }
    }

    /// Replaces the jitter source.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Writes one batch, retrying transient conflicts.
    pub async fn insert_account_balances(
        &self,
        rows: &[AccountBalanceDaily],
    ) -> Result<(), PersistError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.inner.insert_account_balances(rows).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(attempt, rows = rows.len(), "Batch persisted after retry");
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(err);
            }
            if attempt >= self.policy.max_attempts {
                warn!(
                    attempts = attempt,
                    rows = rows.len(),
                    error = %err,
                    "Write conflict retries exhausted"
                );
                return Err(PersistError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff(attempt - 1, self.jitter.as_ref());
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay = ?delay,
                error = %err,
                "Write conflict, retrying batch"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PersistError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
