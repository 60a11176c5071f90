//! Prometheus HTTP API client and probe

use super::{BackendClient, ProbeReport, truncated, unix_now};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Metric name prefixes expected in a healthy stack, with their source
pub const EXPECTED_METRICS: &[(&str, &str)] = &[
    ("api_requests_total", "forum-api"),
    ("http_request_duration_seconds", "forum-api"),
    ("http_requests_active", "forum-api"),
    ("db_requests_total", "forum-api"),
    ("prometheus_", "prometheus"),
    ("jaeger_", "jaeger-collector"),
    ("loki_", "loki"),
    ("promtail_", "promtail"),
    ("alertmanager_", "alertmanager"),
    ("grafana_", "grafana"),
];

/// Instant queries whose current values are shown by the probe
pub const SAMPLE_QUERIES: &[(&str, &str)] = &[
    ("api_requests_total", "Total API requests"),
    ("http_requests_active", "Currently active requests"),
    ("up{job='forum-api'}", "Forum API availability"),
    ("up{job='jaeger-collector'}", "Jaeger collector availability"),
    ("up{job='loki'}", "Loki availability"),
];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<Sample>,
}

/// One instant-vector element: labels and `[timestamp, "value"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: (f64, String),
}

impl Sample {
    /// Numeric value; `None` for unparsable strings
    pub fn value(&self) -> Option<f64> {
        self.value.1.parse().ok()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct TargetsData {
    #[serde(rename = "activeTargets", default)]
    active_targets: Vec<Target>,
}

/// A scrape target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "scrapePool", default)]
    pub scrape_pool: Option<String>,
    pub health: String,
}

impl Target {
    pub fn job(&self) -> &str {
        self.labels
            .get("job")
            .or(self.scrape_pool.as_ref())
            .map(String::as_str)
            .unwrap_or("unknown")
    }
}

/// Client for one Prometheus server
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base_url: String,
    client: BackendClient,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>, client: BackendClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn is_up(&self) -> bool {
        self.client
            .get_text(&self.url("/api/v1/query"), &[("query", "up".to_string())])
            .await
            .is_some()
    }

    /// Run an instant query at the current time
    ///
    /// `None` when the server is unreachable, errors or does not report
    /// `status: success`.
    pub async fn query(&self, promql: &str) -> Option<Vec<Sample>> {
        let params = [
            ("query", promql.to_string()),
            ("time", format!("{:.3}", unix_now().as_secs_f64())),
        ];
        let envelope: Envelope<QueryData> = self
            .client
            .get_json(&self.url("/api/v1/query"), &params)
            .await?;
        if envelope.status != "success" {
            tracing::warn!(query = promql, status = %envelope.status, "Prometheus query did not succeed");
            return None;
        }
        Some(envelope.data.result)
    }

    pub async fn metric_names(&self) -> Option<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .client
            .get_json(&self.url("/api/v1/label/__name__/values"), &[])
            .await?;
        Some(envelope.data)
    }

    pub async fn targets(&self) -> Option<Vec<Target>> {
        let envelope: Envelope<TargetsData> = self
            .client
            .get_json(&self.url("/api/v1/targets"), &[])
            .await?;
        Some(envelope.data.active_targets)
    }

    /// Check reachability, targets, expected metrics and sample values
    pub async fn probe(&self) -> ProbeReport {
        let mut report = ProbeReport::new("Prometheus metrics collection");

        if !self.is_up().await {
            report.fail(format!("Prometheus is not accessible at {}", self.base_url));
            return report;
        }
        report.pass("Prometheus is accessible");

        match self.targets().await {
            Some(targets) if !targets.is_empty() => {
                for target in &targets {
                    let line = format!("target {}: {}", target.job(), target.health);
                    if target.health == "up" {
                        report.pass(line);
                    } else {
                        report.fail(line);
                    }
                }
            }
            Some(_) => {
                report.warn("No active scrape targets");
            }
            None => {
                report.warn("Target status unavailable");
            }
        }

        let names = self.metric_names().await.unwrap_or_default();
        for (prefix, source) in EXPECTED_METRICS {
            let matching: Vec<&String> = names.iter().filter(|m| m.starts_with(prefix)).collect();
            if matching.is_empty() {
                report.warn(format!("{}* (no metrics found from {})", prefix, source));
            } else {
                report
                    .pass(format!(
                        "{}* ({} metrics from {})",
                        prefix,
                        matching.len(),
                        source
                    ))
                    .details = truncated(&matching, 3, "metrics");
            }
        }
        report.info(format!("Total metrics available: {}", names.len()));

        for (query, description) in SAMPLE_QUERIES {
            match self.query(query).await {
                Some(samples) => match samples.first().and_then(Sample::value) {
                    Some(value) => {
                        report.info(format!("{}: {}", description, value));
                    }
                    None => {
                        report.warn(format!("{}: No data", description));
                    }
                },
                None => {
                    report.warn(format!("{}: Query failed", description));
                }
            }
        }

        report
    }
}
