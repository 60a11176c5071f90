//! Traffic scenarios
//!
//! Each scenario runs against the forum API until its duration elapses or the
//! shared stop signal fires, and returns a `RunReport`.

pub mod bursts;
pub mod n_plus_one;
pub mod users;

use crate::forum::{Call, ForumApi};
use crate::traffic::driver::{LoadDriver, LoadPlan};
use crate::traffic::pacing::StopSignal;
use crate::traffic::stats::RunReport;
use std::time::Duration;

pub use bursts::{BurstConfig, memory, slow};
pub use n_plus_one::NPlusOneConfig;
pub use users::{UserProfile, UserTask, UsersPlan};

/// Everything a scenario needs
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub api: ForumApi,
    pub driver: LoadDriver,
}

impl ScenarioContext {
    pub fn new(api: ForumApi, driver: LoadDriver) -> Self {
        Self { api, driver }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        self.driver.stop_signal()
    }
}

/// Fixed-rate load against one endpoint
pub async fn load(ctx: &ScenarioContext, plan: &LoadPlan) -> RunReport {
    ctx.driver
        .run(ctx.api.executor(), ctx.api.base_url(), plan)
        .await
}

/// Run load, N+1, slow and memory in sequence
///
/// A stop cancels the running scenario and skips the remaining ones.
pub async fn all(ctx: &ScenarioContext, plan: &LoadPlan, duration: Duration) -> Vec<RunReport> {
    let mut reports = vec![load(ctx, plan).await];

    if !ctx.stop_signal().is_stopped() {
        let config = NPlusOneConfig {
            duration,
            ..NPlusOneConfig::default()
        };
        reports.push(n_plus_one::run(ctx, &config).await);
    }
    if !ctx.stop_signal().is_stopped() {
        reports.push(slow(ctx, &BurstConfig::slow(duration)).await);
    }
    if !ctx.stop_signal().is_stopped() {
        reports.push(memory(ctx, &BurstConfig::memory(duration)).await);
    }

    reports
}

fn record_calls(report: &mut RunReport, calls: &[Call]) {
    for call in calls {
        report.record(call.label, &call.outcome);
    }
}
