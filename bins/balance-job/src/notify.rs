//! Operator notification channels for the job binary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use daybook_core::notify::{LogNotifier, Notifier, NotifyError};
use daybook_shared::NotificationConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Payload<'a> {
    operation: &'a str,
    message: &'a str,
    sent_at: DateTime<Utc>,
}

/// Posts notifications as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, operation: &str, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Payload {
                operation,
                message,
                sent_at: Utc::now(),
            })
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// The configured operator channel.
#[derive(Debug, Clone)]
pub enum OperatorChannel {
    /// JSON webhook.
    Webhook(WebhookNotifier),
    /// Log output only, when no webhook is configured.
    Log(LogNotifier),
}

impl OperatorChannel {
    /// Picks the channel from configuration.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        match config.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(Self::Webhook(WebhookNotifier::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?)),
            _ => Ok(Self::Log(LogNotifier)),
        }
    }
}

impl Notifier for OperatorChannel {
    async fn notify(&self, operation: &str, message: &str) -> Result<(), NotifyError> {
        match self {
            Self::Webhook(webhook) => webhook.notify(operation, message).await,
            Self::Log(log) => log.notify(operation, message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_webhook_falls_back_to_log() {
        let config = NotificationConfig {
            webhook_url: Some("  ".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(
            OperatorChannel::from_config(&config).unwrap(),
            OperatorChannel::Log(_)
        ));

        let config = NotificationConfig {
            webhook_url: Some("https://hooks.example.com/daybook".to_string()),
            timeout_secs: 5,
        };
        assert!(matches!(
            OperatorChannel::from_config(&config).unwrap(),
            OperatorChannel::Webhook(_)
        ));
    }

    #[test]
    fn test_payload_shape() {
        let payload = Payload {
            operation: "daily_balance",
            message: "started",
            sent_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["operation"], "daily_balance");
        assert_eq!(json["message"], "started");
        assert_eq!(json["sent_at"], "1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_delivery_error() {
        let webhook = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_secs(1)).unwrap();
        let err = webhook.notify("daily_balance", "started").await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(_)));
    }
}
