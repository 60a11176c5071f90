//! Weighted virtual-user workload
//!
//! Each virtual user repeatedly picks a task by weight, runs it, then pauses
//! for a uniformly random think time. Contributors read and write; viewers
//! only read. Every finished task is sent to one collecting loop that owns
//! the report.

use super::{ScenarioContext, record_calls};
use crate::forum::{Call, ForumApi};
use crate::traffic::ids::EntityKind;
use crate::traffic::pacing::StopSignal;
use crate::traffic::stats::RunReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// One thing a virtual user can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserTask {
    ListBoards,
    CreateBoard,
    ListPosts,
    CreatePost,
    GetPost,
    CreateComment,
    ListComments,
    Health,
    Slow,
    Metrics,
    /// List boards, then the posts of the first listed board
    BrowsePosts,
}

const CONTRIBUTOR_TASKS: &[(UserTask, u32)] = &[
    (UserTask::ListBoards, 2),
    (UserTask::CreateBoard, 1),
    (UserTask::ListPosts, 2),
    (UserTask::CreatePost, 1),
    (UserTask::GetPost, 1),
    (UserTask::CreateComment, 1),
    (UserTask::ListComments, 1),
    (UserTask::Health, 1),
    (UserTask::Slow, 1),
];

const VIEWER_TASKS: &[(UserTask, u32)] = &[
    (UserTask::ListBoards, 5),
    (UserTask::BrowsePosts, 3),
    (UserTask::Health, 2),
    (UserTask::Metrics, 1),
    (UserTask::Slow, 1),
];

/// Kind of virtual user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserProfile {
    Contributor,
    Viewer,
}

impl UserProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserProfile::Contributor => "contributor",
            UserProfile::Viewer => "viewer",
        }
    }

    pub fn tasks(&self) -> &'static [(UserTask, u32)] {
        match self {
            UserProfile::Contributor => CONTRIBUTOR_TASKS,
            UserProfile::Viewer => VIEWER_TASKS,
        }
    }

    /// Pause between tasks, in milliseconds
    pub fn think_time_ms(&self) -> RangeInclusive<u64> {
        match self {
            UserProfile::Contributor => 1_000..=5_000,
            UserProfile::Viewer => 1_000..=3_000,
        }
    }

    /// Weighted random task choice
    pub fn pick_task<R: Rng>(&self, rng: &mut R) -> UserTask {
        let tasks = self.tasks();
        let total: u32 = tasks.iter().map(|(_, weight)| weight).sum();
        let roll = rng.random_range(0..total);

        let mut cumulative = 0;
        for (task, weight) in tasks {
            cumulative += weight;
            if roll < cumulative {
                return *task;
            }
        }
        // Unreachable: roll < total == final cumulative weight
        tasks[tasks.len() - 1].0
    }
}

/// Virtual-user run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersPlan {
    pub contributors: usize,
    pub viewers: usize,
    pub duration: Duration,
    /// Seed for reproducible task choices; random when `None`
    pub seed: Option<u64>,
}

/// Run one task; tasks missing a prerequisite id list boards or do nothing
pub async fn run_task(api: &ForumApi, task: UserTask) -> Vec<Call> {
    let ids = api.ids();
    match task {
        UserTask::ListBoards => api.browse_boards().await.calls,
        UserTask::CreateBoard => vec![api.create_board().await],
        UserTask::ListPosts => match ids.sample(EntityKind::Board) {
            Some(board) => vec![api.list_posts(&board).await],
            None => vec![api.list_boards().await],
        },
        UserTask::CreatePost => match ids.sample(EntityKind::Board) {
            Some(board) => vec![api.create_post(&board).await],
            None => vec![api.list_boards().await],
        },
        UserTask::GetPost => match ids.sample(EntityKind::Post) {
            Some(post) => vec![api.get_post(&post).await],
            None => Vec::new(),
        },
        UserTask::CreateComment => match ids.sample(EntityKind::Post) {
            Some(post) => vec![api.create_comment(&post).await],
            None => Vec::new(),
        },
        UserTask::ListComments => match ids.sample(EntityKind::Post) {
            Some(post) => vec![api.list_comments(&post).await],
            None => Vec::new(),
        },
        UserTask::Health => vec![api.health().await],
        UserTask::Slow => vec![api.slow().await],
        UserTask::Metrics => vec![api.metrics().await],
        UserTask::BrowsePosts => {
            let boards = api.list_boards().await;
            let first = boards.first_id().cloned();
            let mut calls = vec![boards];
            if let Some(board) = first {
                calls.push(api.list_posts(&board).await);
            }
            calls
        }
    }
}

async fn virtual_user(
    api: ForumApi,
    profile: UserProfile,
    mut rng: StdRng,
    deadline: Instant,
    stop: StopSignal,
    results: mpsc::UnboundedSender<Vec<Call>>,
) {
    while !stop.is_stopped() && Instant::now() < deadline {
        let task = profile.pick_task(&mut rng);
        let calls = run_task(&api, task).await;
        if results.send(calls).is_err() {
            break;
        }

        let think = Duration::from_millis(rng.random_range(profile.think_time_ms()))
            .min(deadline.saturating_duration_since(Instant::now()));
        if !stop.sleep_or_stop(think).await {
            break;
        }
    }
}

/// Run the weighted user mix until the duration elapses or a stop
pub async fn run(ctx: &ScenarioContext, plan: &UsersPlan) -> RunReport {
    let stop = ctx.stop_signal().clone();
    let mut report = RunReport::new("users");
    let started = Instant::now();
    let deadline = started + plan.duration;

    tracing::info!(
        contributors = plan.contributors,
        viewers = plan.viewers,
        duration_secs = plan.duration.as_secs_f64(),
        "Starting virtual users"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut users = JoinSet::new();
    let profiles = std::iter::repeat_n(UserProfile::Contributor, plan.contributors)
        .chain(std::iter::repeat_n(UserProfile::Viewer, plan.viewers));

    for (index, profile) in profiles.enumerate() {
        let rng = match plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_os_rng(),
        };
        users.spawn(virtual_user(
            ctx.api.clone(),
            profile,
            rng,
            deadline,
            stop.clone(),
            tx.clone(),
        ));
    }
    drop(tx);

    while let Some(calls) = rx.recv().await {
        report.submitted += 1;
        record_calls(&mut report, &calls);
    }

    while let Some(joined) = users.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Virtual user task failed");
        }
    }

    report.stopped_early = stop.is_stopped();
    report.elapsed = started.elapsed();
    tracing::info!(
        tasks = report.submitted,
        requests = report.total_requests(),
        errors = report.total_errors(),
        "Virtual users finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_pick_task_follows_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<UserTask, u32> = HashMap::new();
        for _ in 0..12_000 {
            *counts.entry(UserProfile::Viewer.pick_task(&mut rng)).or_default() += 1;
        }

        // Viewer weights sum to 12: list boards 5/12, metrics 1/12
        let list = counts[&UserTask::ListBoards];
        let metrics = counts[&UserTask::Metrics];
        assert!((4_500..5_500).contains(&list), "list boards picked {}", list);
        assert!((700..1_300).contains(&metrics), "metrics picked {}", metrics);
        assert!(!counts.contains_key(&UserTask::CreateBoard));
    }

    #[test]
    fn test_contributor_never_picks_viewer_only_tasks() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..2_000 {
            let task = UserProfile::Contributor.pick_task(&mut rng);
            assert_ne!(task, UserTask::BrowsePosts);
            assert_ne!(task, UserTask::Metrics);
        }
    }

    #[test]
    fn test_profile_weights_total() {
        let total = |p: UserProfile| p.tasks().iter().map(|(_, w)| w).sum::<u32>();
        assert_eq!(total(UserProfile::Contributor), 11);
        assert_eq!(total(UserProfile::Viewer), 12);
    }

    #[test]
    fn test_think_time_ranges() {
        assert_eq!(UserProfile::Contributor.think_time_ms(), 1_000..=5_000);
        assert_eq!(UserProfile::Viewer.think_time_ms(), 1_000..=3_000);
    }
}
