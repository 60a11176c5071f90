//! Outbound notifications
//!
//! The alert bot forwards Alertmanager webhooks through a [`Notifier`].
//! [`TelegramNotifier`] is the production implementation; tests substitute
//! their own.

pub mod alert;
pub mod telegram;

use crate::error::AppResult;
use async_trait::async_trait;

pub use alert::{Alert, AlertBatch, AlertForwarder, format_alert};
pub use telegram::TelegramNotifier;

/// Delivers a Markdown message to a configured destination
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> AppResult<()>;
}
