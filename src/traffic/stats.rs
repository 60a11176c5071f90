//! Per-endpoint aggregate statistics
//!
//! Stats are mutated only by the driver's collecting loop, so they carry no
//! synchronization of their own.

use crate::traffic::executor::Outcome;
use std::collections::BTreeMap;
use std::time::Duration;

/// Index of the p95 element in an ascending sample of length `n`
///
/// `floor(0.95 * n)` in integer arithmetic, clamped to the last element.
pub fn p95_index(n: usize) -> usize {
    (n * 95 / 100).min(n.saturating_sub(1))
}

/// Latency summary in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p95: f64,
}

impl LatencySummary {
    /// Summarize a latency sample; `None` when the sample is empty
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p95: sorted[p95_index(count)],
        })
    }
}

/// Counters and latency sample for one endpoint label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointStats {
    pub requests: u64,
    /// Status >= 400 plus transport failures
    pub errors: u64,
    pub transport_failures: u64,
    pub status_counts: BTreeMap<u16, u64>,
    latencies_ms: Vec<f64>,
}

impl EndpointStats {
    /// Fold one outcome into the counters
    ///
    /// Transport failures count as errors but contribute no latency sample.
    pub fn record(&mut self, outcome: &Outcome) {
        self.requests += 1;
        if outcome.is_error() {
            self.errors += 1;
        }
        match outcome.response() {
            Some(response) => {
                self.latencies_ms.push(response.elapsed_ms());
                *self.status_counts.entry(response.status).or_default() += 1;
            }
            None => self.transport_failures += 1,
        }
    }

    pub fn latencies_ms(&self) -> &[f64] {
        &self.latencies_ms
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.latencies_ms)
    }

    /// Errors as a fraction of requests
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }

    pub fn merge(&mut self, other: &EndpointStats) {
        self.requests += other.requests;
        self.errors += other.errors;
        self.transport_failures += other.transport_failures;
        for (status, count) in &other.status_counts {
            *self.status_counts.entry(*status).or_default() += count;
        }
        self.latencies_ms.extend_from_slice(&other.latencies_ms);
    }
}

/// Result of one scenario run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub name: String,
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub elapsed: Duration,
    /// Units of work submitted (may exceed the request count for units
    /// that issue several requests)
    pub submitted: u64,
    pub stopped_early: bool,
}

impl RunReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, label: &str, outcome: &Outcome) {
        self.endpoints
            .entry(label.to_string())
            .or_default()
            .record(outcome);
    }

    pub fn endpoint(&self, label: &str) -> Option<&EndpointStats> {
        self.endpoints.get(label)
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: &RunReport) {
        for (label, stats) in &other.endpoints {
            self.endpoints.entry(label.clone()).or_default().merge(stats);
        }
        self.elapsed += other.elapsed;
        self.submitted += other.submitted;
        self.stopped_early |= other.stopped_early;
    }

    pub fn total_requests(&self) -> u64 {
        self.endpoints.values().map(|s| s.requests).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.endpoints.values().map(|s| s.errors).sum()
    }

    /// Summary over every endpoint's latencies
    pub fn overall_summary(&self) -> Option<LatencySummary> {
        let all: Vec<f64> = self
            .endpoints
            .values()
            .flat_map(|s| s.latencies_ms.iter().copied())
            .collect();
        LatencySummary::from_samples(&all)
    }
}
