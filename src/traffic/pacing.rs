//! Tick pacing and cooperative cancellation
//!
//! `TickPacer` keeps the driver on one-second ticks without catch-up bursts:
//! a tick that overruns its period is followed immediately by the next one.
//! `StopSignal` is the single shared stop flag checked at tick boundaries,
//! before every submission, and inside every scenario loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Shared, cloneable stop flag
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; idempotent
    pub fn stop(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested, finishing in-flight requests");
        }
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless stopped first
    ///
    /// Returns `true` if the full duration elapsed, `false` on stop.
    pub async fn sleep_or_stop(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = self.cancelled() => false,
        }
    }
}

/// Default tick period for the load driver
pub const TICK: Duration = Duration::from_secs(1);

/// Paces fixed-period ticks
#[derive(Debug)]
pub struct TickPacer {
    period: Duration,
    tick_started: Instant,
}

impl TickPacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick_started: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a tick
    pub fn begin(&mut self) {
        self.tick_started = Instant::now();
    }

    /// Wait out the remainder of the current tick
    ///
    /// Returns the time slept. An overrun tick returns immediately with zero.
    pub async fn pace(&mut self) -> Duration {
        let spent = self.tick_started.elapsed();
        let remaining = self.period.saturating_sub(spent);
        if remaining.is_zero() {
            tracing::debug!(
                spent_ms = spent.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                "Tick overran its period, starting next tick immediately"
            );
        } else {
            tokio::time::sleep(remaining).await;
        }
        remaining
    }
}

impl Default for TickPacer {
    fn default() -> Self {
        Self::new(TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test(start_paused = true)]
    async fn test_pace_sleeps_remainder_of_tick() {
        let mut pacer = TickPacer::default();
        pacer.begin();
        tokio::time::advance(Duration::from_millis(300)).await;

        let started = Instant::now();
        let slept = pacer.pace().await;

        assert_eq!(slept, Duration::from_millis(700));
        let waited = started.elapsed();
        assert!(
            waited >= Duration::from_millis(700) && waited < Duration::from_millis(705),
            "waited {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_tick_does_not_sleep() {
        let mut pacer = TickPacer::default();
        pacer.begin();
        tokio::time::advance(Duration::from_millis(1500)).await;

        let mut pace = tokio_test::task::spawn(pacer.pace());
        let slept = assert_ready!(pace.poll());
        assert_eq!(slept, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_is_pending_until_period_ends() {
        let mut pacer = TickPacer::new(Duration::from_millis(100));
        pacer.begin();

        let mut pace = tokio_test::task::spawn(pacer.pace());
        assert_pending!(pace.poll());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(pace.is_woken());
        assert_ready!(pace.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_stop_interrupted_by_stop() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.sleep_or_stop(Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop();

        let completed = waiter.await.unwrap();
        assert!(!completed);
        assert!(stop.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_stop_completes_without_stop() {
        let stop = StopSignal::new();
        assert!(stop.sleep_or_stop(Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_stopped() {
        let stop = StopSignal::new();
        stop.stop();
        stop.cancelled().await;
        assert!(!stop.sleep_or_stop(Duration::from_secs(1)).await);
    }
}
