//! Fixed-rate load driver
//!
//! Once per tick the driver submits `requests_per_second` units of work to a
//! pool of `min(max_concurrency, requests_per_second)` workers, waits for the
//! whole batch, then paces to the next tick. Results flow back to a single
//! collecting loop that owns the `RunReport`.
//!
//! The run ends when the duration has elapsed or the stop signal fires. The
//! deadline and the stop signal are checked before every submission, so a run
//! never submits more than `requests_per_second * duration` units.

use crate::error::{AppError, AppResult};
use crate::traffic::executor::{HttpMethod, Outcome, RequestExecutor, RequestSpec};
use crate::traffic::join_url;
use crate::traffic::pacing::{StopSignal, TICK, TickPacer};
use crate::traffic::stats::RunReport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Upper bound on concurrent workers
pub const MAX_CONCURRENCY: usize = 50;

/// Labelled outcomes produced by one unit of work
pub type UnitResults = Vec<(String, Outcome)>;

/// A fixed-rate run against one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    /// Path relative to the target base URL, e.g. `/boards`
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Option<serde_json::Value>,
    pub requests_per_second: u32,
    pub duration: Duration,
}

impl LoadPlan {
    /// # Errors
    /// Returns `AppError::Validation` for a zero rate or zero duration
    pub fn new(
        endpoint: impl Into<String>,
        method: HttpMethod,
        payload: Option<serde_json::Value>,
        requests_per_second: u32,
        duration: Duration,
    ) -> AppResult<Self> {
        if requests_per_second == 0 {
            return Err(AppError::Validation(
                "requests_per_second must be at least 1".to_string(),
            ));
        }
        if duration.is_zero() {
            return Err(AppError::Validation(
                "duration must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            endpoint: endpoint.into(),
            method,
            payload,
            requests_per_second,
            duration,
        })
    }
}

/// Drives fixed-rate batches of work
#[derive(Debug, Clone)]
pub struct LoadDriver {
    max_concurrency: usize,
    tick: Duration,
    stop: StopSignal,
}

impl LoadDriver {
    /// `max_concurrency` is clamped to `1..=MAX_CONCURRENCY`
    pub fn new(max_concurrency: usize, stop: StopSignal) -> Self {
        Self {
            max_concurrency: max_concurrency.clamp(1, MAX_CONCURRENCY),
            tick: TICK,
            stop,
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Worker pool size for a given rate
    pub fn pool_size(&self, requests_per_second: u32) -> usize {
        let rps = usize::try_from(requests_per_second).unwrap_or(usize::MAX);
        self.max_concurrency.min(rps).max(1)
    }

    /// Run `plan` against `base_url` through `executor`
    pub async fn run(
        &self,
        executor: &RequestExecutor,
        base_url: &str,
        plan: &LoadPlan,
    ) -> RunReport {
        let mut request = RequestSpec::new(plan.method, join_url(base_url, &plan.endpoint))
            .with_label(plan.endpoint.clone());
        if let Some(payload) = &plan.payload {
            request = request.with_body(payload.clone());
        }

        let request = Arc::new(request);
        let executor = executor.clone();
        self.drive(
            "load",
            plan.requests_per_second,
            plan.duration,
            move || {
                let executor = executor.clone();
                let request = Arc::clone(&request);
                async move {
                    let outcome = executor.execute(&request).await;
                    vec![(request.label.clone(), outcome)]
                }
            },
        )
        .await
    }

    /// Submit `make_unit()` `requests_per_second` times per tick until
    /// `duration` elapses or the stop signal fires
    pub async fn drive<F, Fut>(
        &self,
        name: &str,
        requests_per_second: u32,
        duration: Duration,
        make_unit: F,
    ) -> RunReport
    where
        F: Fn() -> Fut,
        Fut: Future<Output = UnitResults> + Send + 'static,
    {
        let mut report = RunReport::new(name);
        if requests_per_second == 0 {
            return report;
        }

        let pool_size = self.pool_size(requests_per_second);
        let pool = Arc::new(Semaphore::new(pool_size));
        let mut pacer = TickPacer::new(self.tick);

        let started = Instant::now();
        let deadline = started + duration;

        tracing::info!(
            scenario = name,
            requests_per_second,
            duration_secs = duration.as_secs_f64(),
            pool_size,
            "Starting load run"
        );

        let mut tick: u64 = 0;
        loop {
            if self.stop.is_stopped() {
                report.stopped_early = true;
                break;
            }
            if Instant::now() >= deadline {
                break;
            }

            pacer.begin();
            let tick_started = Instant::now();
            tick += 1;

            let mut batch = JoinSet::new();
            for _ in 0..requests_per_second {
                if self.stop.is_stopped() {
                    report.stopped_early = true;
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }

                let unit = make_unit();
                let pool = Arc::clone(&pool);
                batch.spawn(async move {
                    // The pool is never closed; a closed pool yields no results
                    let _permit = pool.acquire_owned().await.ok()?;
                    Some(unit.await)
                });
                report.submitted += 1;
            }

            let submitted = batch.len();
            while let Some(joined) = batch.join_next().await {
                match joined {
                    Ok(Some(results)) => {
                        for (label, outcome) in &results {
                            report.record(label, outcome);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(scenario = name, tick, error = %e, "Worker task failed");
                    }
                }
            }

            tracing::debug!(
                scenario = name,
                tick,
                submitted,
                batch_ms = tick_started.elapsed().as_millis() as u64,
                "Tick complete"
            );

            if report.stopped_early {
                break;
            }

            tokio::select! {
                _ = pacer.pace() => {}
                _ = self.stop.cancelled() => {
                    report.stopped_early = true;
                    break;
                }
            }
        }

        report.elapsed = started.elapsed();

        tracing::info!(
            scenario = name,
            ticks = tick,
            submitted = report.submitted,
            requests = report.total_requests(),
            errors = report.total_errors(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            stopped_early = report.stopped_early,
            "Load run finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::executor::{Response, RetryPolicy, Transport, TransportError};
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
    }

    impl InFlight {
        fn enter(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn tracked_unit(
        tracker: &Arc<InFlight>,
        work: Duration,
    ) -> impl Fn() -> BoxFuture<'static, UnitResults> + 'static {
        let tracker = Arc::clone(tracker);
        move || {
            let tracker = Arc::clone(&tracker);
            Box::pin(async move {
                tracker.enter();
                tokio::time::sleep(work).await;
                tracker.leave();
                vec![(
                    "/health".to_string(),
                    Outcome::Success(Response::new(200, work, "ok")),
                )]
            })
        }
    }

    #[test]
    fn test_pool_size_is_min_of_concurrency_and_rate() {
        let driver = LoadDriver::new(50, StopSignal::new());
        assert_eq!(driver.pool_size(5), 5);
        assert_eq!(driver.pool_size(80), 50);

        let capped = LoadDriver::new(500, StopSignal::new());
        assert_eq!(capped.pool_size(200), MAX_CONCURRENCY);

        let narrow = LoadDriver::new(0, StopSignal::new());
        assert_eq!(narrow.pool_size(10), 1);
    }

    #[test]
    fn test_load_plan_rejects_zero_rate() {
        assert!(LoadPlan::new("/health", HttpMethod::Get, None, 0, Duration::from_secs(1)).is_err());
        assert!(LoadPlan::new("/health", HttpMethod::Get, None, 1, Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_rps_for_three_seconds_submits_fifteen() {
        let tracker = Arc::new(InFlight::default());
        let driver = LoadDriver::new(50, StopSignal::new());

        let report = driver
            .drive(
                "health",
                5,
                Duration::from_secs(3),
                tracked_unit(&tracker, Duration::from_millis(100)),
            )
            .await;

        assert_eq!(report.submitted, 15);
        assert_eq!(report.total_requests(), 15);
        assert_eq!(tracker.started.load(Ordering::SeqCst), 15);
        assert!(tracker.peak.load(Ordering::SeqCst) <= 5);
        assert!(!report.stopped_early);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_cap() {
        let tracker = Arc::new(InFlight::default());
        let driver = LoadDriver::new(50, StopSignal::new());

        let report = driver
            .drive(
                "burst",
                80,
                Duration::from_secs(1),
                tracked_unit(&tracker, Duration::from_millis(200)),
            )
            .await;

        assert_eq!(report.submitted, 80);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_run_within_one_tick() {
        let tracker = Arc::new(InFlight::default());
        let stop = StopSignal::new();
        let driver = LoadDriver::new(50, stop.clone());

        let stopper = {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                stop.stop();
            })
        };

        let report = driver
            .drive(
                "health",
                2,
                Duration::from_secs(60),
                tracked_unit(&tracker, Duration::from_millis(10)),
            )
            .await;
        stopper.await.unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.submitted, 4);
        assert!(report.elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_batch_overruns_without_catch_up() {
        let tracker = Arc::new(InFlight::default());
        let driver = LoadDriver::new(1, StopSignal::new());

        // One worker, two units of 700ms each: every tick takes 1.4s
        let report = driver
            .drive(
                "slow",
                2,
                Duration::from_secs(3),
                tracked_unit(&tracker, Duration::from_millis(700)),
            )
            .await;

        // Ticks start at 0s, 1.4s and 2.8s
        assert_eq!(report.submitted, 6);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    struct Status(u16);

    #[async_trait]
    impl Transport for Status {
        async fn send(&self, _request: &RequestSpec) -> Result<Response, TransportError> {
            Ok(Response::new(self.0, Duration::from_millis(3), "{}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_counts_http_errors() {
        let executor = RequestExecutor::new(Arc::new(Status(500)), RetryPolicy::default());
        let driver = LoadDriver::new(50, StopSignal::new());
        let plan = LoadPlan::new(
            "/boards",
            HttpMethod::Post,
            Some(serde_json::json!({"name": "x"})),
            3,
            Duration::from_secs(2),
        )
        .unwrap();

        let report = driver.run(&executor, "http://api", &plan).await;

        let stats = report.endpoint("/boards").expect("endpoint should be recorded");
        assert_eq!(stats.requests, 6);
        assert_eq!(stats.errors, 6);
        assert_eq!(stats.summary().unwrap().p95, 3.0);
    }
}
