//! Loki HTTP API client and probe

use super::{BackendClient, ProbeReport, truncated, unix_now};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Log queries run by the probe
pub const SAMPLE_QUERIES: &[(&str, &str)] = &[
    (r#"{job="containerlogs"}"#, "All container logs"),
    (
        r#"{job="containerlogs", container_name=~".*backend.*"}"#,
        "Backend application logs",
    ),
    (r#"{job="forum-app"}"#, "Forum app specific logs"),
    (r#"{job="syslog"}"#, "System logs"),
];

/// Backend logs that carry a trace id
pub const TRACE_QUERY: &str = r#"{job="containerlogs", container_name=~".*backend.*"} |= "trace_id""#;

/// How far back log queries look
pub const LOG_LOOKBACK: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    #[serde(default)]
    result: Vec<LogStream>,
}

/// One log stream: its labels and `[nanosecond timestamp, line]` pairs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogStream {
    #[serde(default)]
    pub stream: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(String, String)>,
}

impl LogStream {
    pub fn labels(&self) -> String {
        self.stream
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn preview(line: &str, max_chars: usize) -> String {
    if line.chars().count() > max_chars {
        format!("{}...", line.chars().take(max_chars).collect::<String>())
    } else {
        line.to_string()
    }
}

/// Client for one Loki server
#[derive(Debug, Clone)]
pub struct LokiClient {
    base_url: String,
    client: BackendClient,
}

impl LokiClient {
    pub fn new(base_url: impl Into<String>, client: BackendClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_ready(&self) -> bool {
        self.client.is_up(&format!("{}/ready", self.base_url)).await
    }

    pub async fn labels(&self) -> Option<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .client
            .get_json(&format!("{}/loki/api/v1/labels", self.base_url), &[])
            .await?;
        Some(envelope.data)
    }

    pub async fn label_values(&self, label: &str) -> Option<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .client
            .get_json(
                &format!("{}/loki/api/v1/label/{}/values", self.base_url, label),
                &[],
            )
            .await?;
        Some(envelope.data)
    }

    /// Newest-first log lines matching `query` within `lookback`
    pub async fn query_range(
        &self,
        query: &str,
        limit: usize,
        lookback: Duration,
    ) -> Option<Vec<LogStream>> {
        let end = unix_now();
        let start = end.saturating_sub(lookback);
        let params = [
            ("query", query.to_string()),
            ("start", start.as_nanos().to_string()),
            ("end", end.as_nanos().to_string()),
            ("limit", limit.to_string()),
            ("direction", "backward".to_string()),
        ];
        let envelope: Envelope<QueryRangeData> = self
            .client
            .get_json(
                &format!("{}/loki/api/v1/query_range", self.base_url),
                &params,
            )
            .await?;
        Some(envelope.data.result)
    }

    /// Check readiness, labels, sample queries and trace-enabled logs
    pub async fn probe(&self) -> ProbeReport {
        let mut report = ProbeReport::new("Loki log aggregation");

        if !self.is_ready().await {
            report.fail(format!("Loki is not accessible at {}", self.base_url));
            return report;
        }
        report.pass("Loki is accessible");

        let labels = self.labels().await.unwrap_or_default();
        if labels.is_empty() {
            report.warn("No log labels available");
        } else {
            report.info("Available log labels").details = truncated(&labels, 10, "labels");
        }

        for (label, title) in [("job", "Available jobs"), ("container_name", "Available containers")] {
            if labels.iter().any(|l| l == label)
                && let Some(values) = self.label_values(label).await
            {
                report.info(title).details = truncated(&values, 10, "values");
            }
        }

        for (query, description) in SAMPLE_QUERIES {
            match self.query_range(query, 5, LOG_LOOKBACK).await {
                Some(streams) => {
                    let total: usize = streams.iter().map(|s| s.values.len()).sum();
                    let mut details = Vec::new();
                    for stream in &streams {
                        details.push(format!(
                            "stream [{}]: {} log entries",
                            stream.labels(),
                            stream.values.len()
                        ));
                        for (_, line) in stream.values.iter().take(2) {
                            details.push(format!("  {}", preview(line, 100)));
                        }
                    }
                    let line = if total > 0 {
                        report.pass(format!("{}: found {} log entries", description, total))
                    } else {
                        report.warn(format!("{}: no log entries found", description))
                    };
                    line.details = details;
                }
                None => {
                    report.warn(format!("{}: query failed or returned no results", description));
                }
            }
        }

        match self.query_range(TRACE_QUERY, 3, LOG_LOOKBACK).await {
            Some(streams) => {
                let total: usize = streams.iter().map(|s| s.values.len()).sum();
                if total > 0 {
                    let sample = streams
                        .iter()
                        .flat_map(|s| s.values.iter())
                        .next()
                        .map(|(_, line)| preview(line, 200));
                    report
                        .pass(format!("Found {} log entries with trace information", total))
                        .details = sample.into_iter().collect();
                } else {
                    report.warn("No trace-enabled logs found");
                }
            }
            None => {
                report.warn("Failed to query trace logs");
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_parses_values() {
        let stream: LogStream = serde_json::from_str(
            r#"{"stream": {"job": "forum-app", "level": "info"},
                "values": [["1718000000000000000", "GET /boards 200"]]}"#,
        )
        .unwrap();
        assert_eq!(stream.values.len(), 1);
        assert_eq!(stream.labels(), "job=forum-app, level=info");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }
}
