//! Bulk persistence of computed balances.
//!
//! Account balance batches go through [`RetryingSink`], which retries
//! transient write conflicts with exponential backoff, and [`BatchFlusher`],
//! which writes them in order or through a bounded set of background tasks.

mod flusher;
mod retry;
mod sink;

pub use flusher::{BatchFlusher, FlushStats};
pub use retry::{Jitter, NoJitter, RandomJitter, RetryPolicy, RetryingSink};
pub use sink::{BalanceSink, ClearedRows, PersistError};
