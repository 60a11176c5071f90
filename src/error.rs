//! Error types for loadpulse
//!
//! Process-level failures (configuration, notifier delivery) are `AppError`s.
//! Inside the traffic engine, request failures are values
//! (`traffic::Outcome`) and never surface as errors.
//!
//! All errors implement `IntoResponse` so Axum handlers can return them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Notification delivery failed: {0}")]
    Notify(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Transport { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Parse { .. }
            | Self::Notify(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
