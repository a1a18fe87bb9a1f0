//! Best-effort operator notifications.

use thiserror::Error;
use tracing::info;

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The channel could not be reached.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// The channel answered with a non-success status.
    #[error("Notification rejected with status {0}")]
    Rejected(u16),
}

impl NotifyError {
    /// Returns the error code used in logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Delivery(_) => "NOTIFY_DELIVERY_FAILED",
            Self::Rejected(_) => "NOTIFY_REJECTED",
        }
    }
}

/// Operator channel. Failures are logged by the caller and never fail a run.
pub trait Notifier: Send + Sync {
    /// Sends `message` about `operation`.
    fn notify(
        &self,
        operation: &str,
        message: &str,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, operation: &str, message: &str) -> Result<(), NotifyError> {
        info!(operation, message, "Operator notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("daily_balance", "started").await.is_ok());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(NotifyError::Rejected(502).error_code(), "NOTIFY_REJECTED");
        assert_eq!(
            NotifyError::Rejected(502).to_string(),
            "Notification rejected with status 502"
        );
    }
}
