//! Dependent-data (N+1) access pattern
//!
//! Creates a parent board, lists boards, creates `children_per_parent` posts
//! under the first listed board, then repeatedly lists that board's posts and
//! fetches every listed post individually. List requests are sequential; the
//! per-post requests of one round run concurrently on a bounded pool and are
//! all awaited before the next round.

use super::{ScenarioContext, record_calls};
use crate::forum::Call;
use crate::traffic::stats::RunReport;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::Instant;

/// N+1 scenario settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NPlusOneConfig {
    pub children_per_parent: usize,
    /// Concurrent per-child requests within one round
    pub fanout: usize,
    pub round_pause: Duration,
    pub duration: Duration,
}

impl Default for NPlusOneConfig {
    fn default() -> Self {
        Self {
            children_per_parent: 20,
            fanout: 10,
            round_pause: Duration::from_millis(500),
            duration: Duration::from_secs(30),
        }
    }
}

pub async fn run(ctx: &ScenarioContext, config: &NPlusOneConfig) -> RunReport {
    let api = &ctx.api;
    let stop = ctx.stop_signal();
    let mut report = RunReport::new("n-plus-one");
    let started = Instant::now();

    let created = api
        .create_board_with("Bottleneck Test Board", "Board for testing N+1 problem")
        .await;
    let created_ok = created.outcome.status() == Some(201);
    record_calls(&mut report, std::slice::from_ref(&created));
    report.submitted += 1;
    if !created_ok {
        tracing::error!(status = ?created.outcome.status(), "Failed to create test board");
        report.elapsed = started.elapsed();
        return report;
    }

    let boards = api.list_boards().await;
    record_calls(&mut report, std::slice::from_ref(&boards));
    report.submitted += 1;
    let Some(board) = boards.first_id().cloned() else {
        tracing::error!(status = ?boards.outcome.status(), "No boards available");
        report.elapsed = started.elapsed();
        return report;
    };

    for i in 1..=config.children_per_parent {
        if stop.is_stopped() {
            break;
        }
        let call = api
            .create_post_with(
                &board,
                &format!("Bottleneck Test Post {}", i),
                &format!("This is test post {} for bottleneck testing", i),
                "Bottleneck Tester",
            )
            .await;
        record_calls(&mut report, &[call]);
        report.submitted += 1;
    }

    tracing::info!(
        board = %board,
        children = config.children_per_parent,
        duration_secs = config.duration.as_secs_f64(),
        "Starting N+1 access pattern"
    );

    let deadline = Instant::now() + config.duration;
    let mut rounds: u64 = 0;
    while !stop.is_stopped() && Instant::now() < deadline {
        let listed = api.list_posts(&board).await;
        report.submitted += 1;

        if listed.outcome.success_response().is_some() {
            let children: Vec<Call> = stream::iter(listed.ids.iter())
                .map(|post| api.get_post(post))
                .buffer_unordered(config.fanout.max(1))
                .collect()
                .await;
            report.submitted += children.len() as u64;
            record_calls(&mut report, &children);
        }
        record_calls(&mut report, &[listed]);
        rounds += 1;

        if !stop.sleep_or_stop(config.round_pause).await {
            break;
        }
    }

    report.stopped_early = stop.is_stopped();
    report.elapsed = started.elapsed();
    tracing::info!(
        rounds,
        requests = report.total_requests(),
        errors = report.total_errors(),
        "N+1 simulation complete"
    );
    report
}
