//! Lifecycle event notifications.
//!
//! Publishes creating/ready/failed events to a configured webhook so a
//! UI can mirror session progress. Publishing is fire-and-forget: a
//! sink that is down never affects the pipeline.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

/// Lifecycle event published to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Provisioning started.
    Creating,
    /// The environment answered its liveness probe.
    Ready { url: String },
    /// The session ended with a terminal reason.
    Failed { reason: String },
}

impl SessionEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Publishes session events based on configuration.
pub struct Notifier {
    config: NotificationConfig,
}

impl Notifier {
    /// Create a new notifier from configuration.
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }

    /// Publish an event for a session.
    ///
    /// Fire-and-forget: delivery errors are logged and swallowed so the
    /// pipeline never blocks on the sink.
    pub async fn publish(&self, session_id: &str, event: &SessionEvent) {
        let Some(ref value) = self.config.webhook else {
            return;
        };

        let url = value.strip_prefix("webhook:").unwrap_or(value);
        if url.is_empty() || value == "none" {
            return;
        }

        if let Err(e) = self.send_webhook(url, session_id, event).await {
            warn!("Failed to send {} webhook: {}", event.kind(), e);
        }
    }

    /// Send webhook POST request with exponential backoff retry.
    ///
    /// Retries up to 3 times with delays of 2s, 4s on transient failures.
    async fn send_webhook(&self, url: &str, session_id: &str, event: &SessionEvent) -> Result<()> {
        let payload = json!({
            "event": event.kind(),
            "session_id": session_id,
            "url": match event {
                SessionEvent::Ready { url } => Some(url.as_str()),
                _ => None,
            },
            "reason": match event {
                SessionEvent::Failed { reason } => Some(reason.as_str()),
                _ => None,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });

        debug!("Sending webhook to {}: {:?}", url, payload);

        let client = reqwest::Client::new();
        let max_attempts = 3;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay_secs = 1u64 << attempt;
                debug!(
                    "Webhook retry attempt {} after {}s delay",
                    attempt + 1,
                    delay_secs
                );
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
            }

            match client.post(url).json(&payload).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        debug!("Webhook sent successfully");
                        return Ok(());
                    }

                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    // Retry on 5xx server errors and 429 rate limit
                    if status.is_server_error() || status.as_u16() == 429 {
                        last_error = Some(format!("Webhook returned {status}: {body}"));
                        continue;
                    }

                    // Don't retry client errors (4xx except 429)
                    anyhow::bail!("Webhook returned error status {status}: {body}");
                }
                Err(e) => {
                    // Retry on network errors
                    last_error = Some(e.to_string());
                }
            }
        }

        anyhow::bail!(
            "Webhook failed after {max_attempts} attempts: {}",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )
    }
}
