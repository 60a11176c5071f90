//! Sequential per-endpoint latency benchmark
//!
//! Unlike the load driver, the analyzer sends one request at a time with a
//! short gap between iterations, so each sample is the latency of an idle
//! server. The sweep walks the forum API the way a user would (boards, a
//! board, its posts, a post, its comments) and collects the trace ids the
//! server reports so slow requests can be looked up in the tracing backend.

use crate::forum::{ForumApi, routes};
use crate::traffic::executor::{HttpMethod, Outcome, RequestSpec};
use crate::traffic::join_url;
use crate::traffic::pacing::StopSignal;
use crate::traffic::stats::LatencySummary;
use std::future::Future;
use std::time::Duration;

/// How many trace ids the report lists
pub const SAMPLE_TRACE_IDS: usize = 5;

/// Analyzer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Requests per read endpoint
    pub iterations: usize,
    /// Requests against `/slow`
    pub slow_iterations: usize,
    /// Pause after every request
    pub gap: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            slow_iterations: 2,
            gap: Duration::from_millis(100),
        }
    }
}

/// Samples collected for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointTiming {
    pub label: String,
    pub method: HttpMethod,
    pub latencies_ms: Vec<f64>,
    pub statuses: Vec<u16>,
    /// Requests that produced no response
    pub failures: usize,
    pub trace_ids: Vec<String>,
}

impl EndpointTiming {
    fn new(label: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            label: label.into(),
            method,
            latencies_ms: Vec::new(),
            statuses: Vec::new(),
            failures: 0,
            trace_ids: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.response() {
            Some(response) => {
                self.latencies_ms.push(response.elapsed_ms());
                self.statuses.push(response.status);
                if let Some(trace_id) = response.lookup_trace_id() {
                    self.trace_ids.push(trace_id.to_string());
                }
            }
            None => self.failures += 1,
        }
    }

    /// At least one request got a response
    pub fn responded(&self) -> bool {
        !self.statuses.is_empty()
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.latencies_ms)
    }
}

/// Result of an analyzer run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub endpoints: Vec<EndpointTiming>,
    pub stopped_early: bool,
}

impl Analysis {
    pub fn endpoint(&self, label: &str) -> Option<&EndpointTiming> {
        self.endpoints.iter().find(|e| e.label == label)
    }

    /// Trace ids in the order they were collected
    pub fn trace_ids(&self) -> impl Iterator<Item = &str> {
        self.endpoints
            .iter()
            .flat_map(|e| e.trace_ids.iter().map(String::as_str))
    }
}

/// Runs sequential benchmarks against the forum API
#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    api: ForumApi,
    config: AnalyzerConfig,
    stop: StopSignal,
}

impl PerformanceAnalyzer {
    pub fn new(api: ForumApi, config: AnalyzerConfig, stop: StopSignal) -> Self {
        Self { api, config, stop }
    }

    /// Send `iterations` requests one after another, pausing `gap` after each
    async fn measure<F, Fut>(
        &self,
        label: &str,
        method: HttpMethod,
        iterations: usize,
        mut request: F,
    ) -> EndpointTiming
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut timing = EndpointTiming::new(label, method);
        tracing::info!(endpoint = label, %method, iterations, "Testing endpoint");

        for iteration in 1..=iterations {
            if self.stop.is_stopped() {
                break;
            }
            let outcome = request().await;
            match outcome.response() {
                Some(response) => tracing::info!(
                    endpoint = label,
                    iteration,
                    status = response.status,
                    elapsed_ms = response.elapsed_ms(),
                    trace_id = response.lookup_trace_id().unwrap_or("unknown"),
                    "Request timed"
                ),
                None => tracing::warn!(endpoint = label, iteration, "Request got no response"),
            }
            timing.record(&outcome);

            if !self.stop.sleep_or_stop(self.config.gap).await {
                break;
            }
        }
        timing
    }

    /// Benchmark one endpoint of the target
    pub async fn run_endpoint(
        &self,
        path: &str,
        method: HttpMethod,
        payload: Option<serde_json::Value>,
    ) -> Analysis {
        let mut request = RequestSpec::new(method, join_url(self.api.base_url(), path))
            .with_label(path);
        request.body = payload;

        let executor = self.api.executor();
        let request = &request;
        let timing = self
            .measure(path, method, self.config.iterations, move || {
                executor.execute(request)
            })
            .await;

        Analysis {
            endpoints: vec![timing],
            stopped_early: self.stop.is_stopped(),
        }
    }

    /// Benchmark every default endpoint
    ///
    /// Dependent endpoints are skipped when the board or post they need
    /// cannot be created or listed.
    pub async fn run_sweep(&self) -> Analysis {
        let api = &self.api;
        let n = self.config.iterations;
        let mut endpoints = Vec::new();

        endpoints.push(
            self.measure(routes::HEALTH, HttpMethod::Get, n, move || async move {
                api.health().await.outcome
            })
            .await,
        );
        endpoints.push(
            self.measure(routes::BOARDS, HttpMethod::Get, n, move || async move {
                api.list_boards().await.outcome
            })
            .await,
        );

        let created = self
            .measure(routes::BOARDS, HttpMethod::Post, 1, move || async move {
                api.create_board_with(
                    "Performance Test Board",
                    "Board created for performance testing",
                )
                .await
                .outcome
            })
            .await;
        let board_created = created.responded();
        endpoints.push(created);

        let board = if board_created && !self.stop.is_stopped() {
            api.list_boards().await.first_id().cloned()
        } else {
            None
        };

        if let Some(board) = &board {
            endpoints.push(
                self.measure(routes::BOARD, HttpMethod::Get, n, move || async move {
                    api.get_board(board).await.outcome
                })
                .await,
            );
            endpoints.push(
                self.measure(routes::BOARD_POSTS, HttpMethod::Get, n, move || async move {
                    api.list_posts(board).await.outcome
                })
                .await,
            );

            let created = self
                .measure(routes::POSTS, HttpMethod::Post, 1, move || async move {
                    api.create_post_with(
                        board,
                        "Performance Test Post",
                        "Post created for performance testing",
                        "Performance Tester",
                    )
                    .await
                    .outcome
                })
                .await;
            let post_created = created.responded();
            endpoints.push(created);

            let post = if post_created && !self.stop.is_stopped() {
                api.list_posts(board).await.first_id().cloned()
            } else {
                None
            };

            if let Some(post) = &post {
                endpoints.push(
                    self.measure(routes::POST, HttpMethod::Get, n, move || async move {
                        api.get_post(post).await.outcome
                    })
                    .await,
                );
                endpoints.push(
                    self.measure(routes::POST_COMMENTS, HttpMethod::Get, n, move || async move {
                        api.list_comments(post).await.outcome
                    })
                    .await,
                );
            } else {
                tracing::warn!(board = %board, "No post available, skipping post endpoints");
            }
        } else {
            tracing::warn!("No board available, skipping board and post endpoints");
        }

        endpoints.push(
            self.measure(
                routes::SLOW,
                HttpMethod::Get,
                self.config.slow_iterations,
                move || async move { api.slow().await.outcome },
            )
            .await,
        );

        Analysis {
            endpoints,
            stopped_early: self.stop.is_stopped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::executor::{FailureKind, Response, TransportError};

    #[test]
    fn test_timing_prefers_server_trace_id() {
        let mut timing = EndpointTiming::new("/health", HttpMethod::Get);
        let mut ours = Response::new(200, Duration::from_millis(4), "");
        ours.trace_id = Some("client".to_string());

        timing.record(&Outcome::Success(ours.clone().with_server_trace_id("server")));
        timing.record(&Outcome::Success(ours));
        timing.record(&Outcome::Success(Response::new(
            503,
            Duration::from_millis(9),
            "",
        )));
        timing.record(&Outcome::TransientFailure(TransportError::new(
            FailureKind::Connect,
            "refused",
        )));

        assert_eq!(timing.trace_ids, vec!["server", "client"]);
        assert_eq!(timing.statuses, vec![200, 200, 503]);
        assert_eq!(timing.failures, 1);
        let summary = timing.summary().unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.max, 9.0);
    }

    #[test]
    fn test_timing_without_responses() {
        let mut timing = EndpointTiming::new("/slow", HttpMethod::Get);
        timing.record(&Outcome::PermanentFailure(TransportError::new(
            FailureKind::InvalidRequest,
            "bad url",
        )));
        assert!(!timing.responded());
        assert!(timing.summary().is_none());
    }

    #[test]
    fn test_analysis_trace_ids_in_order() {
        let mut a = EndpointTiming::new("/health", HttpMethod::Get);
        a.trace_ids = vec!["t1".to_string(), "t2".to_string()];
        let mut b = EndpointTiming::new("/boards", HttpMethod::Get);
        b.trace_ids = vec!["t3".to_string()];
        let analysis = Analysis {
            endpoints: vec![a, b],
            ..Analysis::default()
        };
        assert_eq!(analysis.trace_ids().collect::<Vec<_>>(), vec!["t1", "t2", "t3"]);
        assert_eq!(analysis.endpoint("/boards").unwrap().trace_ids.len(), 1);
    }
}
