//! Jaeger query API client and probe

use super::{BackendClient, ProbeReport, truncated, unix_now};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Collector counters that should exist on the admin endpoint
pub const KEY_METRICS: &[&str] = &[
    "jaeger_collector_spans_received_total",
    "jaeger_collector_spans_saved_total",
    "jaeger_collector_traces_received_total",
    "jaeger_collector_traces_saved_total",
];

/// How far back trace searches look
pub const TRACE_LOOKBACK: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(alias = "operationName")]
    name: String,
}

/// A trace returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Trace {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<Span>,
}

/// A span; times are microseconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Span {
    #[serde(rename = "operationName", default)]
    pub operation_name: String,
    #[serde(rename = "startTime", default)]
    pub start_time: u64,
    #[serde(default)]
    pub duration: u64,
}

impl Trace {
    /// Wall time from the first span start to the last span end
    pub fn duration(&self) -> Duration {
        let start = self.spans.iter().map(|s| s.start_time).min();
        let end = self
            .spans
            .iter()
            .map(|s| s.start_time.saturating_add(s.duration))
            .max();
        match (start, end) {
            (Some(start), Some(end)) => Duration::from_micros(end.saturating_sub(start)),
            _ => Duration::ZERO,
        }
    }

    /// Distinct operation names among the first `limit` spans
    pub fn operations(&self, limit: usize) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .spans
            .iter()
            .take(limit)
            .map(|s| s.operation_name.as_str())
            .collect();
        names.into_iter().collect()
    }
}

/// Metric names from a Prometheus text exposition, sorted and deduplicated
pub fn exposition_metric_names(text: &str) -> Vec<String> {
    let names: BTreeSet<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split([' ', '{']).next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    names.into_iter().collect()
}

/// Client for the Jaeger query service and its admin port
#[derive(Debug, Clone)]
pub struct JaegerClient {
    base_url: String,
    admin_url: String,
    client: BackendClient,
}

impl JaegerClient {
    pub fn new(
        base_url: impl Into<String>,
        admin_url: impl Into<String>,
        client: BackendClient,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_url: admin_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_up(&self) -> bool {
        self.client.is_up(&format!("{}/", self.base_url)).await
    }

    /// Admin `/metrics` exposition text
    pub async fn admin_metrics(&self) -> Option<String> {
        self.client
            .get_text(&format!("{}/metrics", self.admin_url), &[])
            .await
    }

    pub async fn services(&self) -> Option<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .client
            .get_json(&format!("{}/api/services", self.base_url), &[])
            .await?;
        Some(envelope.data.unwrap_or_default())
    }

    pub async fn operations(&self, service: &str) -> Option<Vec<String>> {
        let envelope: Envelope<Vec<Operation>> = self
            .client
            .get_json(
                &format!("{}/api/services/{}/operations", self.base_url, service),
                &[],
            )
            .await?;
        Some(
            envelope
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|op| op.name)
                .collect(),
        )
    }

    /// Recent traces for `service` within `lookback`
    pub async fn traces(&self, service: &str, limit: usize, lookback: Duration) -> Option<Vec<Trace>> {
        let end = unix_now();
        let start = end.saturating_sub(lookback);
        let params = [
            ("service", service.to_string()),
            ("start", start.as_micros().to_string()),
            ("end", end.as_micros().to_string()),
            ("limit", limit.to_string()),
        ];
        let envelope: Envelope<Vec<Trace>> = self
            .client
            .get_json(&format!("{}/api/traces", self.base_url), &params)
            .await?;
        Some(envelope.data.unwrap_or_default())
    }

    /// Check the UI, services, operations, recent traces and collector metrics
    pub async fn probe(&self) -> ProbeReport {
        let mut report = ProbeReport::new("Jaeger distributed tracing");

        if !self.is_up().await {
            report.fail(format!("Jaeger UI is not accessible at {}", self.base_url));
            return report;
        }
        report.pass("Jaeger UI is accessible");

        let admin_metrics = self.admin_metrics().await;
        if admin_metrics.is_some() {
            report.pass("Jaeger metrics endpoint is accessible");
        } else {
            report.warn("Jaeger metrics endpoint is not accessible");
        }

        let services = self.services().await.unwrap_or_default();
        if services.is_empty() {
            report.warn("No services found reporting to Jaeger");
        } else {
            report.info("Services reporting to Jaeger").details = services.clone();
        }

        for service in &services {
            match self.operations(service).await {
                Some(ops) if !ops.is_empty() => {
                    report.info(format!("Operations for '{}'", service)).details =
                        truncated(&ops, 10, "operations");
                }
                _ => {
                    report.warn(format!("No operations found for '{}'", service));
                }
            }
        }

        for service in services.iter().take(2) {
            match self.traces(service, 5, TRACE_LOOKBACK).await {
                Some(traces) if !traces.is_empty() => {
                    let details = traces
                        .iter()
                        .take(3)
                        .map(|t| {
                            format!(
                                "{}... ({} spans, {:.1}ms) operations: {}",
                                t.trace_id.chars().take(16).collect::<String>(),
                                t.spans.len(),
                                t.duration().as_secs_f64() * 1000.0,
                                t.operations(5).join(", ")
                            )
                        })
                        .collect();
                    report
                        .pass(format!("Found {} recent traces for {}", traces.len(), service))
                        .details = details;
                }
                Some(_) => {
                    report.warn(format!("No recent traces found for {}", service));
                }
                None => {
                    report.fail(format!("Failed to search traces for {}", service));
                }
            }
        }

        match admin_metrics.as_deref().map(exposition_metric_names) {
            Some(names) if !names.is_empty() => {
                report.info(format!("Total metrics available: {}", names.len()));
                for metric in KEY_METRICS {
                    if names.iter().any(|n| n == metric) {
                        report.pass(metric.to_string());
                    } else {
                        report.warn(format!("{} missing", metric));
                    }
                }
            }
            _ => {
                report.warn("No metrics available from Jaeger");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_duration_spans_all_children() {
        let trace: Trace = serde_json::from_str(
            r#"{
                "traceID": "abc123",
                "spans": [
                    {"operationName": "GET /boards", "startTime": 1000, "duration": 500},
                    {"operationName": "db.query", "startTime": 1100, "duration": 800}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(trace.duration(), Duration::from_micros(900));
        assert_eq!(trace.operations(5), vec!["GET /boards", "db.query"]);
    }

    #[test]
    fn test_trace_without_spans() {
        let trace: Trace = serde_json::from_str(r#"{"traceID": "x"}"#).unwrap();
        assert_eq!(trace.duration(), Duration::ZERO);
        assert!(trace.operations(5).is_empty());
    }

    #[test]
    fn test_operation_accepts_both_field_names() {
        let ops: Vec<Operation> =
            serde_json::from_str(r#"[{"name": "a", "spanKind": "server"}, {"operationName": "b"}]"#)
                .unwrap();
        assert_eq!(ops[0].name, "a");
        assert_eq!(ops[1].name, "b");
    }

    #[test]
    fn test_exposition_metric_names() {
        let text = "# HELP jaeger_collector_spans_received_total spans\n\
                    # TYPE jaeger_collector_spans_received_total counter\n\
                    jaeger_collector_spans_received_total{svc=\"a\"} 3\n\
                    jaeger_collector_spans_received_total{svc=\"b\"} 4\n\
                    go_goroutines 12\n";
        assert_eq!(
            exposition_metric_names(text),
            vec![
                "go_goroutines".to_string(),
                "jaeger_collector_spans_received_total".to_string()
            ]
        );
    }
}
