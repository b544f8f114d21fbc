//! Fixed-interval scheduler for Roomhub.
//!
//! The master sweeps expired access grants once per interval. That loop
//! is driven by an [`IntervalScheduler`], which also reports sweeps that
//! run late or eat too much of their interval.
//!
//! A zero period disables the scheduler: [`IntervalScheduler::wait_for_tick`]
//! pends forever, so a `select!` loop keeps serving its other branches.
//!
//! ```ignore
//! let mut scheduler = IntervalScheduler::new(Duration::from_secs(1));
//! loop {
//!     scheduler.wait_for_tick().await;
//!     registry.lock().await.clear_timed_out_accesses();
//!     scheduler.record_tick_end();
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Share of the period a tick's work may take before a warning is logged.
const BUDGET_WARN_THRESHOLD: f64 = 0.5;

/// Fires a tick every `period`. Missed ticks are skipped, never replayed.
///
/// Time is measured with [`tokio::time::Instant`], so a paused test clock
/// drives the scheduler deterministically.
#[derive(Debug)]
pub struct IntervalScheduler {
    period: Duration,
    tick_count: u64,
    next_tick: Option<Instant>,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<Instant>,
}

impl IntervalScheduler {
    /// First tick fires one `period` from now.
    pub fn new(period: Duration) -> Self {
        let next_tick = (!period.is_zero()).then(|| Instant::now() + period);
        debug!(?period, disabled = next_tick.is_none(), "interval scheduler created");
        Self {
            period,
            tick_count: 0,
            next_tick,
            tick_start: None,
        }
    }

    /// Waits until the next tick is due and returns its number, starting at 1.
    pub async fn wait_for_tick(&mut self) -> u64 {
        let Some(next) = self.next_tick else {
            return std::future::pending().await;
        };
        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(now);

        let skipped = now.saturating_duration_since(next).as_nanos() / self.period.as_nanos();
        if skipped > 0 {
            warn!(tick = self.tick_count, skipped, "interval overrun, skipping ahead");
        }
        self.next_tick = Some(now + self.period);

        trace!(tick = self.tick_count, "tick fired");
        self.tick_count
    }

    /// Marks the work for the current tick as done and warns if it used
    /// at least half of the period.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let utilization = elapsed.as_secs_f64() / self.period.as_secs_f64();
        if utilization >= BUDGET_WARN_THRESHOLD {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "tick work is using most of its interval"
            );
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.next_tick.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
