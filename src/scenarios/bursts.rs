//! Round-based bursts: slow-endpoint and memory-pressure simulations
//!
//! Each round issues `width` concurrent requests, waits for all of them, then
//! pauses before the next round.

use super::{ScenarioContext, record_calls};
use crate::forum::{Call, ForumApi};
use crate::traffic::stats::RunReport;
use futures::future::join_all;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Size of the generated board description for memory pressure
pub const LARGE_PAYLOAD_BYTES: usize = 10 * 1024;

/// Round settings for a burst scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstConfig {
    pub width: usize,
    pub pause: Duration,
    pub duration: Duration,
}

impl BurstConfig {
    /// 5 concurrent `GET /slow`, 0.5s between rounds
    pub fn slow(duration: Duration) -> Self {
        Self {
            width: 5,
            pause: Duration::from_millis(500),
            duration,
        }
    }

    /// 5 concurrent large `POST /boards`, 0.2s between rounds
    pub fn memory(duration: Duration) -> Self {
        Self {
            width: 5,
            pause: Duration::from_millis(200),
            duration,
        }
    }
}

/// Hit the slow endpoint to produce slow traces
pub async fn slow(ctx: &ScenarioContext, config: &BurstConfig) -> RunReport {
    rounds(ctx, "slow", config, |api| async move { api.slow().await }).await
}

/// Create boards with large descriptions to grow server memory
pub async fn memory(ctx: &ScenarioContext, config: &BurstConfig) -> RunReport {
    let description = "X".repeat(LARGE_PAYLOAD_BYTES);
    let description = description.as_str();
    rounds(ctx, "memory", config, move |api| async move {
        let name = format!("Memory Test Board {}", rand::rng().random_range(1..=10_000));
        api.create_board_with(&name, description).await
    })
    .await
}

async fn rounds<'a, F, Fut>(
    ctx: &'a ScenarioContext,
    name: &str,
    config: &BurstConfig,
    request: F,
) -> RunReport
where
    F: Fn(&'a ForumApi) -> Fut,
    Fut: Future<Output = Call>,
{
    let stop = ctx.stop_signal();
    let mut report = RunReport::new(name);
    let started = Instant::now();
    let deadline = started + config.duration;

    tracing::info!(
        scenario = name,
        width = config.width,
        pause_ms = config.pause.as_millis() as u64,
        duration_secs = config.duration.as_secs_f64(),
        "Starting burst simulation"
    );

    while !stop.is_stopped() && Instant::now() < deadline {
        let calls = join_all((0..config.width).map(|_| request(&ctx.api))).await;
        report.submitted += calls.len() as u64;
        record_calls(&mut report, &calls);

        if !stop.sleep_or_stop(config.pause).await {
            break;
        }
    }

    report.stopped_early = stop.is_stopped();
    report.elapsed = started.elapsed();
    tracing::info!(
        scenario = name,
        requests = report.total_requests(),
        errors = report.total_errors(),
        "Burst simulation complete"
    );
    report
}
