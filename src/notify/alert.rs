//! Alertmanager webhook payloads and forwarding

use super::Notifier;
use crate::error::AppResult;
use crate::metrics::Metrics;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const STARTUP_MESSAGE: &str = "🚀 *Alert Bot is now active*\nMonitoring system alerts.";
pub const SHUTDOWN_MESSAGE: &str =
    "⚠️ *Alert Bot is shutting down*\nAlert notifications will be unavailable.";

/// Alertmanager webhook body; only the fields we forward
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AlertBatch {
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Alert {
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

fn unknown_status() -> String {
    "unknown".to_string()
}

impl Alert {
    pub fn is_firing(&self) -> bool {
        self.status == "firing"
    }

    pub fn name(&self) -> &str {
        self.labels
            .get("alertname")
            .map(String::as_str)
            .unwrap_or("Unknown Alert")
    }
}

/// Markdown message for one alert
pub fn format_alert(alert: &Alert) -> String {
    let emoji = if alert.is_firing() { "🔴" } else { "✅" };
    let summary = alert
        .annotations
        .get("summary")
        .map(String::as_str)
        .unwrap_or("No summary provided");
    let description = alert
        .annotations
        .get("description")
        .map(String::as_str)
        .unwrap_or("No description provided");
    let call_to_action = if alert.is_firing() {
        "*Please check the system immediately!*"
    } else {
        "*Alert resolved. No further action needed.*"
    };

    format!(
        "{} *{}* - {}\n\n*Summary:* {}\n*Description:* {}\n\n{}",
        emoji,
        alert.name(),
        alert.status.to_uppercase(),
        summary,
        description,
        call_to_action
    )
}

/// Forwards alerts and lifecycle messages through a notifier
#[derive(Clone)]
pub struct AlertForwarder {
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<Metrics>>,
}

impl AlertForwarder {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send(&self, text: &str) -> AppResult<()> {
        let result = self.notifier.send(text).await;
        if result.is_err()
            && let Some(metrics) = &self.metrics
        {
            metrics.notify_failure();
        }
        result
    }

    /// Startup message; failure here aborts bot startup
    pub async fn announce_startup(&self) -> AppResult<()> {
        tracing::info!("Starting alert bot");
        self.send(STARTUP_MESSAGE).await
    }

    /// Best-effort shutdown message
    pub async fn announce_shutdown(&self) {
        tracing::info!("Shutting down alert bot");
        if let Err(e) = self.send(SHUTDOWN_MESSAGE).await {
            tracing::warn!(error = %e, "Failed to send shutdown message");
        }
    }

    /// Send one message per alert, in order, stopping at the first failure
    ///
    /// Returns the number of alerts sent.
    pub async fn forward(&self, batch: &AlertBatch) -> AppResult<usize> {
        for (index, alert) in batch.alerts.iter().enumerate() {
            tracing::info!(
                alert = alert.name(),
                status = %alert.status,
                index,
                "Forwarding alert"
            );
            if let Err(e) = self.send(&format_alert(alert)).await {
                tracing::error!(alert = alert.name(), error = %e, "Error processing alert");
                return Err(e);
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_alert_forwarded(&alert.status);
            }
        }
        Ok(batch.alerts.len())
    }
}
