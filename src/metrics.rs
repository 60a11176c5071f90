//! Prometheus self-metrics for loadpulse
//!
//! This module provides instrumentation for tracking:
//! - Generated requests by endpoint and outcome class
//! - Request latency by endpoint
//! - Transport retries by endpoint
//! - Alerts forwarded by the alert bot, and notifier delivery failures
//!
//! Endpoint labels are route templates (`/boards/{id}/posts`), never concrete
//! paths, so cardinality stays bounded by the number of routes.
//!
//! Metrics are exposed by the alert bot at `/metrics` and can be dumped after
//! a load run with `--print-metrics`.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Outcome class for type-safe metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// A response with status < 400
    Success,
    /// A response with status >= 400
    HttpError,
    /// No response after retries, or a non-retryable transport error
    TransportFailure,
}

impl OutcomeClass {
    /// Convert outcome class to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::HttpError => "http_error",
            OutcomeClass::TransportFailure => "transport_failure",
        }
    }
}

/// Metrics collector for loadpulse
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    retries_total: IntCounterVec,
    alerts_forwarded: IntCounterVec,
    notify_failures: IntCounter,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "loadpulse_requests_total",
                "Total number of generated requests by endpoint and outcome class",
            ),
            &["endpoint", "outcome"],
        )?;

        // Buckets span fast reads up to the 30s read timeout
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "loadpulse_request_duration_ms",
                "Latency of answered requests in milliseconds",
            )
            .buckets(vec![
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
                30000.0,
            ]),
            &["endpoint"],
        )?;

        let retries_total = IntCounterVec::new(
            Opts::new(
                "loadpulse_retries_total",
                "Total number of transport-level retries by endpoint",
            ),
            &["endpoint"],
        )?;

        let alerts_forwarded = IntCounterVec::new(
            Opts::new(
                "loadpulse_alerts_forwarded_total",
                "Total number of alerts forwarded to the notification channel by alert status",
            ),
            &["status"],
        )?;

        let notify_failures = IntCounter::with_opts(Opts::new(
            "loadpulse_notify_failures_total",
            "Total number of notification deliveries that failed",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(alerts_forwarded.clone()))?;
        registry.register(Box::new(notify_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            request_duration,
            retries_total,
            alerts_forwarded,
            notify_failures,
        })
    }

    /// Record one completed request (after retries)
    pub fn record_request(&self, endpoint: &str, outcome: OutcomeClass) {
        self.requests_total
            .with_label_values(&[endpoint, outcome.as_str()])
            .inc();
    }

    /// Record the latency of an answered request
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite, or negative. Such
    /// values would corrupt every percentile of the histogram.
    pub fn record_duration(&self, endpoint: &str, duration_ms: f64) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {}",
                duration_ms
            )));
        }

        self.request_duration
            .get_metric_with_label_values(&[endpoint])?
            .observe(duration_ms);
        Ok(())
    }

    /// Record one transport-level retry
    pub fn record_retry(&self, endpoint: &str) {
        self.retries_total.with_label_values(&[endpoint]).inc();
    }

    /// Record one alert forwarded by the alert bot
    pub fn record_alert_forwarded(&self, status: &str) {
        self.alerts_forwarded.with_label_values(&[status]).inc();
    }

    /// Record a failed notification delivery
    pub fn notify_failure(&self) {
        self.notify_failures.inc();
    }

    /// Current request count for one endpoint/outcome pair
    pub fn requests_count(&self, endpoint: &str, outcome: OutcomeClass) -> u64 {
        self.requests_total
            .with_label_values(&[endpoint, outcome.as_str()])
            .get()
    }

    /// Current retry count for one endpoint
    pub fn retries_count(&self, endpoint: &str) -> u64 {
        self.retries_total.with_label_values(&[endpoint]).get()
    }

    /// Current forwarded-alert count for one alert status
    pub fn alerts_forwarded_count(&self, status: &str) -> u64 {
        self.alerts_forwarded.with_label_values(&[status]).get()
    }

    /// Current count of failed notification deliveries
    pub fn notify_failures_count(&self) -> u64 {
        self.notify_failures.get()
    }

    /// Gather metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if the text encoder fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Metrics output is not valid UTF-8: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new_creates_registry() {
        let metrics = Metrics::new().expect("Failed to create metrics");

        metrics.record_request("/boards", OutcomeClass::Success);
        metrics
            .record_duration("/boards", 12.5)
            .expect("Test operation should succeed");
        metrics.record_retry("/boards");
        metrics.record_alert_forwarded("firing");
        metrics.notify_failure();

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names.len(), 5, "Expected 5 metric families");
        assert!(names.contains(&"loadpulse_requests_total".to_string()));
        assert!(names.contains(&"loadpulse_request_duration_ms".to_string()));
        assert!(names.contains(&"loadpulse_retries_total".to_string()));
        assert!(names.contains(&"loadpulse_alerts_forwarded_total".to_string()));
        assert!(names.contains(&"loadpulse_notify_failures_total".to_string()));
    }

    #[test]
    fn test_record_request_increments_counter() {
        let metrics = Metrics::new().expect("Failed to create test metrics");

        metrics.record_request("/boards", OutcomeClass::HttpError);
        metrics.record_request("/boards", OutcomeClass::HttpError);
        metrics.record_request("/boards", OutcomeClass::Success);

        assert_eq!(metrics.requests_count("/boards", OutcomeClass::HttpError), 2);
        assert_eq!(metrics.requests_count("/boards", OutcomeClass::Success), 1);
        assert_eq!(
            metrics.requests_count("/boards", OutcomeClass::TransportFailure),
            0
        );
    }

    #[test]
    fn test_record_duration_rejects_invalid_values() {
        let metrics = Metrics::new().expect("Failed to create test metrics");

        assert!(metrics.record_duration("/boards", f64::NAN).is_err());
        assert!(metrics.record_duration("/boards", f64::INFINITY).is_err());
        assert!(metrics.record_duration("/boards", -1.0).is_err());
        assert!(metrics.record_duration("/boards", 0.0).is_ok());
    }

    #[test]
    fn test_gather_returns_text_format() {
        let metrics = Metrics::new().expect("Failed to create test metrics");
        metrics.record_retry("/posts/{id}");

        let output = metrics.gather().expect("gather should succeed");
        assert!(output.contains("# HELP loadpulse_retries_total"));
        assert!(output.contains("# TYPE loadpulse_retries_total counter"));
        assert!(output.contains(r#"loadpulse_retries_total{endpoint="/posts/{id}"} 1"#));
    }

    #[test]
    fn test_outcome_class_labels() {
        assert_eq!(OutcomeClass::Success.as_str(), "success");
        assert_eq!(OutcomeClass::HttpError.as_str(), "http_error");
        assert_eq!(OutcomeClass::TransportFailure.as_str(), "transport_failure");
    }
}
