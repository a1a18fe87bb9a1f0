//! Staging store error types.

use thiserror::Error;

/// Errors raised by a staging store.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The backing file could not be created or configured.
    #[error("Failed to open staging store {partition}: {source}")]
    Open {
        /// Partition name.
        partition: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A read query failed.
    #[error("Staging read failed in {partition}: {source}")]
    Read {
        /// Partition name.
        partition: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A write or transaction failed.
    #[error("Staging write failed in {partition}: {source}")]
    Write {
        /// Partition name.
        partition: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A value could not be encoded or decoded.
    #[error("Staged value in {partition} could not be encoded: {source}")]
    Codec {
        /// Partition name.
        partition: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Key not present. Callers usually treat this as an implicit zero.
    #[error("Key {key} not found in staging store {partition}")]
    NotFound {
        /// Partition name.
        partition: String,
        /// Missing key.
        key: String,
    },

    /// The store was already closed.
    #[error("Staging store {0} is closed")]
    Closed(String),

    /// A thread panicked while holding the store's connection.
    #[error("Staging store {0} lock poisoned")]
    Poisoned(String),

    /// Staging directory could not be created or removed.
    #[error("Staging directory error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagingError {
    /// Returns the error code used in logs and notifications.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Open { .. } => "STAGING_OPEN_FAILED",
            Self::Read { .. } => "STAGING_READ_FAILED",
            Self::Write { .. } => "STAGING_WRITE_FAILED",
            Self::Codec { .. } => "STAGING_CODEC_FAILED",
            Self::NotFound { .. } => "STAGING_NOT_FOUND",
            Self::Closed(_) => "STAGING_CLOSED",
            Self::Poisoned(_) => "STAGING_POISONED",
            Self::Io(_) => "STAGING_IO_ERROR",
        }
    }

    /// Returns true for the benign missing-key case.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
