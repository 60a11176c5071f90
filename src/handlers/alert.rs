//! Alertmanager webhook receiver

use crate::handlers::AppState;
use crate::notify::AlertBatch;
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AlertResponse {
    pub status: &'static str,
    pub message: String,
}

/// Forward every alert in the webhook body to the notifier
///
/// Always answers 200. A delivery failure is reported in the body as
/// `{"status": "error", "message": ...}`, so Alertmanager does not resend
/// alerts that were already delivered earlier in the batch.
pub async fn handler(
    State(state): State<AppState>,
    Json(batch): Json<AlertBatch>,
) -> Json<AlertResponse> {
    tracing::info!(alerts = batch.alerts.len(), "Received alert webhook");

    if batch.alerts.is_empty() {
        return Json(AlertResponse {
            status: "ok",
            message: "No alerts in the payload".to_string(),
        });
    }

    match state.forwarder().forward(&batch).await {
        Ok(sent) => Json(AlertResponse {
            status: "ok",
            message: format!("Sent {} alerts to Telegram", sent),
        }),
        Err(e) => Json(AlertResponse {
            status: "error",
            message: e.to_string(),
        }),
    }
}
