//! Application configuration management.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::flags::{FeatureFlags, StaticFlags};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Daily balance job configuration.
    pub job: JobConfig,
    /// Operator notification channel.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Static feature-flag variants (flag name → variant).
    #[serde(default)]
    pub features: HashMap<String, String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// How computed balance batches are written to the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Each batch is written before traversal continues, in visit order.
    #[default]
    Sequential,
    /// Batches are written by background tasks and joined at the end.
    Concurrent,
}

/// Daily balance job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Entity codes the job computes balances for.
    pub entity_codes: Vec<String>,
    /// Number of account rows per persistence batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Feature flag whose numeric variant overrides `chunk_size`.
    #[serde(default)]
    pub chunk_size_flag: Option<String>,
    /// Sequential or concurrent batch persistence.
    #[serde(default)]
    pub persist_mode: PersistMode,
    /// Upper bound on in-flight batches in concurrent mode.
    #[serde(default = "default_max_concurrent_flushes")]
    pub max_concurrent_flushes: usize,
    /// Drop movement records whose debit and credit are both zero.
    #[serde(default = "default_skip_zero_movement")]
    pub skip_zero_movement: bool,
    /// Accounts read from the registry staging store per traversal step.
    #[serde(default = "default_traversal_page_size")]
    pub traversal_page_size: usize,
    /// Rows fetched per source query page.
    #[serde(default = "default_source_page_size")]
    pub source_page_size: u64,
    /// Parent directory for run-scoped staging stores (system temp if unset).
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Retry policy for account balance batches.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_max_concurrent_flushes() -> usize {
    4
}

fn default_skip_zero_movement() -> bool {
    true
}

fn default_traversal_page_size() -> usize {
    1000
}

fn default_source_page_size() -> u64 {
    5000
}

/// Retry policy for transient write conflicts.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total insert attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in milliseconds, doubled on every attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_jitter_ms() -> u64 {
    100
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

/// Operator notification channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving JSON notifications; log-only when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

fn default_notification_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("DAYBOOK")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("job.entity_codes")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Returns the static feature flags declared in the `features` table.
    #[must_use]
    pub fn flags(&self) -> StaticFlags {
        StaticFlags::new(self.features.clone())
    }
}

impl JobConfig {
    /// Checks values that deserialize fine but cannot drive a run.
    pub fn validate(&self) -> AppResult<()> {
        if self.entity_codes.is_empty() {
            return Err(AppError::Validation(
                "job.entity_codes must list at least one entity".to_string(),
            ));
        }
        if self.entity_codes.iter().any(|code| code.trim().is_empty()) {
            return Err(AppError::Validation(
                "job.entity_codes must not contain blank codes".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(AppError::Validation(
                "job.chunk_size must be positive".to_string(),
            ));
        }
        if self.max_concurrent_flushes == 0 {
            return Err(AppError::Validation(
                "job.max_concurrent_flushes must be positive".to_string(),
            ));
        }
        if self.traversal_page_size == 0 || self.source_page_size == 0 {
            return Err(AppError::Validation(
                "job page sizes must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Validation(
                "job.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the persistence chunk size.
    ///
    /// A positive integer variant of `chunk_size_flag` wins over the static
    /// `chunk_size`; anything else falls back to it.
    pub fn resolve_chunk_size(&self, flags: &impl FeatureFlags) -> usize {
        self.chunk_size_flag
            .as_deref()
            .and_then(|flag| flags.variant(flag))
            .and_then(|variant| variant.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(self.chunk_size)
    }
}
