//! Webhook notifications.
//!
//! Handles asynchronous dispatch of security alerts to external
//! endpoints. Dispatch is fire-and-forget: if no Tokio runtime is
//! available the notification is dropped with a warning, never
//! blocking or failing the detection path.

use crate::config::{Config, EngineError, Result};
use crate::inspect::threat::SecurityThreat;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Security event types for webhook notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ThreatDetected,
    RateLimitExceeded,
    VelocityAnomaly,
    IpBlocked,
    BlockedIpRejected,
}

/// Webhook payload for security events.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event_type: EventType,
    pub timestamp: i64,
    pub ip: Option<String>,
    pub severity: u8,
    pub message: String,
}

impl WebhookPayload {
    /// Builds a payload summarizing one detected threat.
    #[must_use]
    pub fn from_threat(event_type: EventType, ip: &str, threat: &SecurityThreat) -> Self {
        Self {
            event_type,
            timestamp: i64::try_from(threat.created_at_ms / 1000).unwrap_or(0),
            ip: Some(ip.to_string()),
            severity: threat.severity.rank(),
            message: format!(
                "[{}] {} in {} (confidence {})",
                threat.severity.rank(),
                threat.category.label(),
                threat.source_field,
                threat.confidence
            ),
        }
    }
}

pub struct WebhookNotifier {
    client: Client,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(config: &Arc<Config>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            webhook_url: config.webhook_url.clone(),
            webhook_token: config.webhook_token.clone(),
        }
    }

    /// Queues a notification for delivery. No-op without a configured URL.
    pub fn notify(&self, payload: WebhookPayload) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(event_type = ?payload.event_type, "No async runtime, webhook dropped");
            return;
        };

        let client = self.client.clone();
        let token = self.webhook_token.clone();
        handle.spawn(async move {
            if let Err(e) = Self::send_notification(&client, &url, token.as_deref(), &payload).await
            {
                error!(error = %e, "Webhook notification failed");
            }
        });
    }

    async fn send_notification(
        client: &Client,
        url: &str,
        token: Option<&str>,
        payload: &WebhookPayload,
    ) -> Result<()> {
        let mut req = client
            .post(url)
            .header("Priority", payload.severity.to_string())
            .json(payload);

        if let Some(t) = token {
            req = req.header("Authorization", format!("Bearer {t}"));
        }

        req.send()
            .await
            .map_err(|e| EngineError::Webhook(e.to_string()))?;

        debug!(event_type = ?payload.event_type, "Webhook notification sent");
        Ok(())
    }
}
