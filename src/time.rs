//! Tick timing for the simulation.
//!
//! The simulation advances in discrete ticks at a fixed rate (30 per second
//! by default) no matter how often the host redraws. A tick identifier is
//! simply the wall-clock time divided by the tick interval, so asking twice
//! within the same interval yields the same identifier and the driver can
//! skip the second request.
//!
//! # Example
//!
//! ```ignore
//! use driftlines::time::{FrameScheduler, TickClock};
//!
//! let mut scheduler = FrameScheduler::new(TickClock::default());
//!
//! // In the host's frame callback:
//! if let Some(delay) = scheduler.schedule(now) {
//!     host.set_timer(delay);
//! }
//!
//! // When the timer fires:
//! scheduler.fire();
//! layer.animate(now, &viewport);
//! ```

use std::time::Duration;

/// Nominal simulation rate.
pub const TICKS_PER_SECOND: u32 = 30;

/// Maps wall-clock time to tick identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickClock {
    interval: Duration,
}

impl TickClock {
    /// A clock ticking `ticks_per_second` times per second (at least once).
    pub fn new(ticks_per_second: u32) -> Self {
        Self::with_interval(Duration::from_secs(1) / ticks_per_second.max(1))
    }

    /// A clock with an explicit interval. Zero intervals are raised to 1ns.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_nanos(1)),
        }
    }

    /// Length of one tick.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Identifier of the tick that contains `now`.
    pub fn tick_id(&self, now: Duration) -> u64 {
        (now.as_nanos() / self.interval.as_nanos()) as u64
    }

    /// Time remaining until the next tick boundary after `now`.
    pub fn until_next_tick(&self, now: Duration) -> Duration {
        let interval = self.interval.as_nanos();
        let into = now.as_nanos() % interval;
        Duration::from_nanos((interval - into) as u64)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(TICKS_PER_SECOND)
    }
}

/// Keeps at most one tick in flight.
///
/// The host asks [`schedule`](Self::schedule) on every frame; only the first
/// request after a [`fire`](Self::fire) yields a delay, so re-entrant frame
/// callbacks cannot stack up ticks.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    clock: TickClock,
    pending: bool,
}

impl FrameScheduler {
    pub fn new(clock: TickClock) -> Self {
        Self {
            clock,
            pending: false,
        }
    }

    #[inline]
    pub fn clock(&self) -> TickClock {
        self.clock
    }

    /// Whether a tick has been scheduled and not yet fired.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Claim the next tick slot. Returns the delay until it is due (never
    /// more than one interval), or `None` if a tick is already pending.
    pub fn schedule(&mut self, now: Duration) -> Option<Duration> {
        if self.pending {
            return None;
        }
        self.pending = true;
        Some(self.clock.until_next_tick(now).min(self.clock.interval()))
    }

    /// Mark the pending tick as run.
    pub fn fire(&mut self) {
        self.pending = false;
    }

    /// Drop any pending tick, e.g. on teardown.
    pub fn cancel(&mut self) {
        self.pending = false;
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(TickClock::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_id_is_floor_of_time_over_interval() {
        let clock = TickClock::with_interval(Duration::from_millis(100));
        assert_eq!(clock.tick_id(Duration::ZERO), 0);
        assert_eq!(clock.tick_id(Duration::from_millis(99)), 0);
        assert_eq!(clock.tick_id(Duration::from_millis(100)), 1);
        assert_eq!(clock.tick_id(Duration::from_millis(1050)), 10);
    }

    #[test]
    fn test_default_rate() {
        let clock = TickClock::default();
        assert_eq!(clock.interval(), Duration::from_secs(1) / 30);
        // ~30 distinct ids per second
        let ids: std::collections::BTreeSet<u64> = (0..1000)
            .map(|ms| clock.tick_id(Duration::from_millis(ms)))
            .collect();
        assert_eq!(ids.len(), 30);
    }

    #[test]
    fn test_until_next_tick() {
        let clock = TickClock::with_interval(Duration::from_millis(100));
        assert_eq!(clock.until_next_tick(Duration::from_millis(30)), Duration::from_millis(70));
        assert_eq!(clock.until_next_tick(Duration::from_millis(200)), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        assert_eq!(TickClock::new(0).interval(), Duration::from_secs(1));
        assert_eq!(TickClock::with_interval(Duration::ZERO).interval(), Duration::from_nanos(1));
    }

    #[test]
    fn test_scheduler_single_in_flight() {
        let mut scheduler = FrameScheduler::new(TickClock::with_interval(Duration::from_millis(50)));
        let now = Duration::from_millis(1010);
        assert_eq!(scheduler.schedule(now), Some(Duration::from_millis(40)));
        assert!(scheduler.is_pending());
        assert_eq!(scheduler.schedule(now), None);
        assert_eq!(scheduler.schedule(now + Duration::from_millis(5)), None);

        scheduler.fire();
        assert!(!scheduler.is_pending());
        let delay = scheduler.schedule(Duration::from_millis(1050)).unwrap();
        assert!(delay <= scheduler.clock().interval());
    }

    #[test]
    fn test_scheduler_cancel() {
        let mut scheduler = FrameScheduler::default();
        scheduler.schedule(Duration::ZERO);
        scheduler.cancel();
        assert!(scheduler.schedule(Duration::ZERO).is_some());
    }
}
