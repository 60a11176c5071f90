//! Bottleneck detection from Prometheus instant queries

use super::prometheus::{PrometheusClient, Sample};

pub const COMMON_ISSUES: &[&str] = &[
    "N+1 Query Problem: Look for loops fetching database data",
    "Missing Database Indexes: Check query plans for table scans",
    "Large Payload Sizes: Check response sizes",
    "Resource Contention: Check CPU and memory usage patterns",
    "Connection Pooling: Ensure database connections are pooled properly",
];

pub const NEXT_STEPS: &[&str] = &[
    "Review the source code of slow endpoints",
    "Analyze database queries via tracing",
    "Consider adding caching for frequently accessed data",
    "Profile the application during peak load",
    "Review resource allocation for all services",
];

/// Limits above which a finding is flagged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub slow_p95_ms: f64,
    pub db_rps: f64,
    pub memory_mb: f64,
    /// Fraction of requests answered with 5xx, 0.01 = 1%
    pub error_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow_p95_ms: 500.0,
            db_rps: 50.0,
            memory_mb: 500.0,
            error_ratio: 0.01,
        }
    }
}

/// One analysis section of the report
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
    pub recommendation: Option<String>,
    /// Whether a threshold was crossed
    pub flagged: bool,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            recommendation: None,
            flagged: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BottleneckReport {
    pub prometheus_url: String,
    pub jaeger_url: String,
    pub sections: Vec<Section>,
}

impl BottleneckReport {
    pub fn flagged(&self) -> bool {
        self.sections.iter().any(|s| s.flagged)
    }
}

fn values(samples: &[Sample]) -> impl Iterator<Item = (&Sample, f64)> {
    samples
        .iter()
        .filter_map(|s| s.value().filter(|v| v.is_finite()).map(|v| (s, v)))
}

#[derive(Debug, Clone)]
pub struct BottleneckDetector {
    prometheus: PrometheusClient,
    jaeger_url: String,
    thresholds: Thresholds,
}

impl BottleneckDetector {
    pub fn new(prometheus: PrometheusClient, jaeger_url: impl Into<String>) -> Self {
        Self {
            prometheus,
            jaeger_url: jaeger_url.into(),
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn slow_endpoints_query(&self) -> String {
        format!(
            "histogram_quantile(0.95, sum(rate(http_request_duration_seconds_bucket[5m])) by (le, path)) * 1000 > {}",
            self.thresholds.slow_p95_ms
        )
    }

    pub fn db_usage_query(&self) -> String {
        format!("rate(db_requests_total[1m]) > {}", self.thresholds.db_rps)
    }

    pub const MEMORY_QUERY: &'static str = "process_resident_memory_bytes / 1024 / 1024";

    pub const ERROR_RATIO_QUERY: &'static str = r#"sum(rate(http_server_requests_seconds_count{status=~"5.."}[5m])) / sum(rate(http_server_requests_seconds_count[5m]))"#;

    async fn samples(&self, query: &str) -> Vec<Sample> {
        self.prometheus.query(query).await.unwrap_or_default()
    }

    pub async fn slow_endpoints(&self) -> Section {
        let mut section = Section::new(format!(
            "Slow Endpoints (P95 > {}ms)",
            self.thresholds.slow_p95_ms
        ));
        let samples = self.samples(&self.slow_endpoints_query()).await;
        for (sample, value) in values(&samples) {
            let path = sample.label("path").unwrap_or("unknown");
            section
                .lines
                .push(format!("Path: {} - P95 Latency: {:.2}ms", path, value));
        }
        if section.lines.is_empty() {
            section.lines.push("No slow endpoints detected.".to_string());
        } else {
            section.flagged = true;
            section.recommendation =
                Some("Review these endpoints for optimization opportunities.".to_string());
        }
        section
    }

    pub async fn db_usage(&self) -> Section {
        let mut section = Section::new(format!(
            "High Database Usage (>{} RPS)",
            self.thresholds.db_rps
        ));
        let samples = self.samples(&self.db_usage_query()).await;
        for (_, value) in values(&samples) {
            section
                .lines
                .push(format!("Database Request Rate: {:.2} RPS", value));
        }
        if section.lines.is_empty() {
            section.lines.push("No high database usage detected.".to_string());
        } else {
            section.flagged = true;
            section.recommendation = Some(
                "Consider query optimization, caching, or database scaling.".to_string(),
            );
        }
        section
    }

    pub async fn memory_usage(&self) -> Section {
        let mut section = Section::new("Memory Usage");
        let samples = self.samples(Self::MEMORY_QUERY).await;
        for (_, value) in values(&samples) {
            section.lines.push(format!("Memory Usage: {:.2} MB", value));
            if value > self.thresholds.memory_mb {
                section.lines.push("Warning: High memory usage detected.".to_string());
                section.flagged = true;
            }
        }
        if section.lines.is_empty() {
            section.lines.push("No memory usage data available.".to_string());
        }
        if section.flagged {
            section.recommendation =
                Some("Check for memory leaks or consider scaling.".to_string());
        }
        section
    }

    pub async fn error_rates(&self) -> Section {
        let mut section = Section::new("Error Rates");
        let limit_pct = self.thresholds.error_ratio * 100.0;
        let samples = self.samples(Self::ERROR_RATIO_QUERY).await;
        for (_, value) in values(&samples) {
            let pct = value * 100.0;
            section.lines.push(format!("HTTP Error Rate: {:.2}%", pct));
            if pct > limit_pct {
                section
                    .lines
                    .push(format!("Warning: Error rate exceeds threshold of {}%", limit_pct));
                section.flagged = true;
            }
        }
        if section.lines.is_empty() {
            section.lines.push("No error rate data available.".to_string());
        }
        if section.flagged {
            section.recommendation =
                Some("Investigate logs and traces for error sources.".to_string());
        }
        section
    }

    fn slow_traces(&self) -> Section {
        let mut section = Section::new("Slowest Traces");
        section
            .lines
            .push(format!("To view slow traces, visit: {}", self.jaeger_url));
        section.lines.push(format!(
            "Search for traces with duration > {}ms",
            self.thresholds.slow_p95_ms
        ));
        section
    }

    /// Run every analysis in order
    pub async fn analyze(&self) -> BottleneckReport {
        tracing::info!(
            prometheus = self.prometheus.base_url(),
            jaeger = %self.jaeger_url,
            "Running bottleneck detection"
        );
        let sections = vec![
            self.slow_endpoints().await,
            self.db_usage().await,
            self.memory_usage().await,
            self.error_rates().await,
            self.slow_traces(),
        ];
        let report = BottleneckReport {
            prometheus_url: self.prometheus.base_url().to_string(),
            jaeger_url: self.jaeger_url.clone(),
            sections,
        };
        tracing::info!(flagged = report.flagged(), "Bottleneck detection finished");
        report
    }
}
