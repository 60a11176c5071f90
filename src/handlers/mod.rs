//! HTTP handlers for the alert bot

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::notify::AlertForwarder;
use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod alert;
pub mod health;
pub mod metrics;

/// State shared by the alert bot handlers
///
/// Cheap to clone: the forwarder and metrics are behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    forwarder: AlertForwarder,
    metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(forwarder: AlertForwarder, metrics: Arc<Metrics>) -> Self {
        Self { forwarder, metrics }
    }

    pub fn forwarder(&self) -> &AlertForwarder {
        &self.forwarder
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Alert bot routes: `GET /health`, `POST /alert`, `GET /metrics`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/alert", post(alert::handler))
        .route("/metrics", get(metrics::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the alert bot on `listener` until `shutdown` resolves
///
/// The startup message must be delivered before requests are served; the
/// shutdown message is sent after in-flight requests drain and its failure is
/// only logged.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let forwarder = state.forwarder().clone();
    forwarder.announce_startup().await?;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Alert bot listening");
    }

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Internal(format!("Alert bot server failed: {}", e)));

    forwarder.announce_shutdown().await;
    served
}
