//! Errors that end a daily balance run.

use thiserror::Error;

use crate::persist::PersistError;
use crate::source::SourceError;
use crate::staging::StagingError;

/// Errors that end a daily balance run.
#[derive(Debug, Error)]
pub enum JobError {
    /// A source stream failed during ingestion.
    #[error("Source stream {partition} failed: {source}")]
    Source {
        /// Staging partition the stream feeds.
        partition: &'static str,
        /// Underlying source error.
        #[source]
        source: SourceError,
    },

    /// Chart-of-account reference data could not be loaded.
    #[error("Failed to load reference data: {0}")]
    ReferenceData(#[source] SourceError),

    /// A staging store failed.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// Balances could not be persisted.
    #[error(transparent)]
    Persistence(#[from] PersistError),

    /// The run was cancelled.
    #[error("Job cancelled")]
    Cancelled,

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Task(String),

    /// The run cannot start with the given inputs.
    #[error("Invalid job configuration: {0}")]
    Configuration(String),
}

impl JobError {
    /// Returns the error code used in logs and notifications.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Source { source, .. } => source.error_code(),
            Self::ReferenceData(_) => "REFERENCE_DATA_UNAVAILABLE",
            Self::Staging(e) => e.error_code(),
            Self::Persistence(e) => e.error_code(),
            Self::Cancelled => "JOB_CANCELLED",
            Self::Task(_) => "TASK_FAILED",
            Self::Configuration(_) => "INVALID_CONFIGURATION",
        }
    }

    /// Returns true if rerunning the job for the same date may succeed.
    ///
    /// Writes are upserts, so a rerun supersedes rows of the failed run.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Source { source, .. } | Self::ReferenceData(source) => source.is_retryable(),
            Self::Persistence(e) => matches!(
                e,
                PersistError::WriteConflict { .. } | PersistError::RetriesExhausted { .. }
            ),
            Self::Staging(_) | Self::Cancelled | Self::Task(_) | Self::Configuration(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_delegate() {
        let err = JobError::Source {
            partition: "movements",
            source: SourceError::Query("timeout".into()),
        };
        assert_eq!(err.error_code(), "SOURCE_QUERY_FAILED");
        assert_eq!(
            err.to_string(),
            "Source stream movements failed: Source query failed: timeout"
        );

        let err: JobError = PersistError::Write("x".into()).into();
        assert_eq!(err.error_code(), "WRITE_FAILED");
        assert_eq!(JobError::Cancelled.error_code(), "JOB_CANCELLED");
    }

    #[test]
    fn test_retryable() {
        let exhausted: JobError = PersistError::RetriesExhausted {
            attempts: 3,
            last: Box::new(PersistError::WriteConflict {
                code: "40001".into(),
                message: "could not serialize access".into(),
            }),
        }
        .into();
        assert!(exhausted.is_retryable());
        assert!(!JobError::from(PersistError::Write("x".into())).is_retryable());
        assert!(JobError::ReferenceData(SourceError::Unavailable("down".into())).is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
    }
}
