//! Observability backend probes
//!
//! Typed clients for the metrics (Prometheus), trace (Jaeger) and log (Loki)
//! backends. Each probe produces a [`ProbeReport`] of pass/warn/fail lines.
//! A backend that cannot be reached is a failure; missing or unparsable data
//! is a warning ("no data"), never an error.

pub mod bottleneck;
pub mod jaeger;
pub mod loki;
pub mod prometheus;

use crate::config::BackendsConfig;
use crate::error::AppResult;
use crate::traffic::executor::{HttpTransport, RequestExecutor, RequestSpec, RetryPolicy, Timeouts};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use bottleneck::{BottleneckDetector, BottleneckReport, Thresholds};
pub use jaeger::JaegerClient;
pub use loki::LokiClient;
pub use prometheus::PrometheusClient;

/// Probes fail fast instead of using the load-generation timeouts
pub const PROBE_TIMEOUTS: Timeouts = Timeouts {
    connect: Duration::from_secs(5),
    read: Duration::from_secs(15),
};

/// Outcome of one probe line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Pass,
    Warn,
    Fail,
    /// Informational line (a listing, a sample value)
    Info,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Pass => "PASS",
            ProbeStatus::Warn => "WARN",
            ProbeStatus::Fail => "FAIL",
            ProbeStatus::Info => "INFO",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a probe report, with optional indented details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeLine {
    pub status: ProbeStatus,
    pub message: String,
    pub details: Vec<String>,
}

/// Result of probing one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub name: String,
    pub lines: Vec<ProbeLine>,
}

impl ProbeReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, status: ProbeStatus, message: impl Into<String>) -> &mut ProbeLine {
        self.lines.push(ProbeLine {
            status,
            message: message.into(),
            details: Vec::new(),
        });
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    pub fn pass(&mut self, message: impl Into<String>) -> &mut ProbeLine {
        self.push(ProbeStatus::Pass, message)
    }

    pub fn warn(&mut self, message: impl Into<String>) -> &mut ProbeLine {
        self.push(ProbeStatus::Warn, message)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> &mut ProbeLine {
        self.push(ProbeStatus::Fail, message)
    }

    pub fn info(&mut self, message: impl Into<String>) -> &mut ProbeLine {
        self.push(ProbeStatus::Info, message)
    }

    pub fn has_failures(&self) -> bool {
        self.lines.iter().any(|l| l.status == ProbeStatus::Fail)
    }

    pub fn count(&self, status: ProbeStatus) -> usize {
        self.lines.iter().filter(|l| l.status == status).count()
    }
}

/// Show at most `limit` items, then an "and N more" line
pub(crate) fn truncated<T: fmt::Display>(items: &[T], limit: usize, noun: &str) -> Vec<String> {
    let mut lines: Vec<String> = items.iter().take(limit).map(|i| i.to_string()).collect();
    if items.len() > limit {
        lines.push(format!("... and {} more {}", items.len() - limit, noun));
    }
    lines
}

/// Time since the Unix epoch, zero if the clock is before it
pub(crate) fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Shared GET plumbing for backend clients
#[derive(Debug, Clone)]
pub struct BackendClient {
    executor: RequestExecutor,
}

impl BackendClient {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Single-attempt client with probe timeouts
    pub fn with_probe_defaults() -> AppResult<Self> {
        let transport = HttpTransport::new(PROBE_TIMEOUTS)?;
        let policy = RetryPolicy::new(1, Duration::ZERO)
            .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
        Ok(Self::new(RequestExecutor::new(Arc::new(transport), policy)))
    }

    fn build_url(url: &str, params: &[(&str, String)]) -> Option<String> {
        if params.is_empty() {
            return Some(url.to_string());
        }
        match reqwest::Url::parse_with_params(url, params) {
            Ok(url) => Some(url.into()),
            Err(e) => {
                tracing::warn!(url, error = %e, "Cannot build backend URL");
                None
            }
        }
    }

    /// Whether `url` answers 200
    pub async fn is_up(&self, url: &str) -> bool {
        let outcome = self.executor.execute(&RequestSpec::get(url)).await;
        outcome.status() == Some(200)
    }

    /// Body of a 200 response, `None` otherwise
    pub async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Option<String> {
        let url = Self::build_url(url, params)?;
        let outcome = self.executor.execute(&RequestSpec::get(url.as_str())).await;
        match outcome.response() {
            Some(response) if response.status == 200 => Some(response.body.clone()),
            Some(response) => {
                tracing::warn!(url = %url, status = response.status, "Backend returned an error status");
                None
            }
            None => None,
        }
    }

    /// 200 response decoded as `T`; `None` on any failure
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Option<T> {
        let body = self.get_text(url, params).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(url, error = %e, "Unparsable backend response");
                None
            }
        }
    }
}

/// Probe clients for every configured backend
#[derive(Debug, Clone)]
pub struct Backends {
    pub prometheus: PrometheusClient,
    pub jaeger: JaegerClient,
    pub loki: LokiClient,
}

impl Backends {
    pub fn from_config(config: &BackendsConfig) -> AppResult<Self> {
        let client = BackendClient::with_probe_defaults()?;
        Ok(Self {
            prometheus: PrometheusClient::new(&config.prometheus_url, client.clone()),
            jaeger: JaegerClient::new(&config.jaeger_url, &config.jaeger_admin_url, client.clone()),
            loki: LokiClient::new(&config.loki_url, client),
        })
    }

    /// Probe every backend in turn
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        vec![
            self.prometheus.probe().await,
            self.jaeger.probe().await,
            self.loki.probe().await,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tracks_failures() {
        let mut report = ProbeReport::new("Prometheus");
        report.pass("reachable");
        report.warn("no data").details.push("up".to_string());
        assert!(!report.has_failures());

        report.fail("target down");
        assert!(report.has_failures());
        assert_eq!(report.count(ProbeStatus::Warn), 1);
        assert_eq!(report.lines[1].details, vec!["up".to_string()]);
    }

    #[test]
    fn test_truncated_adds_remainder_line() {
        let items = ["a", "b", "c", "d"];
        assert_eq!(
            truncated(&items, 2, "labels"),
            vec!["a".to_string(), "b".to_string(), "... and 2 more labels".to_string()]
        );
        assert_eq!(truncated(&items, 10, "labels").len(), 4);
    }

    #[test]
    fn test_build_url_encodes_params() {
        let url = BackendClient::build_url(
            "http://prom:9090/api/v1/query",
            &[("query", "up{job='x'}".to_string())],
        )
        .unwrap();
        assert!(url.starts_with("http://prom:9090/api/v1/query?query=up%7Bjob%3D%27x%27%7D"));
    }
}
