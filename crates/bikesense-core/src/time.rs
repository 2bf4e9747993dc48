//! Time sources and elapsed-time bookkeeping
//!
//! The controller never reads the global embassy time driver directly. It goes
//! through [`Clock`] so tests and the simulator can drive time by hand.

use embassy_time::{Duration, Instant, Timer};
use embedded_hal_async::delay::DelayNs;

/// Monotonic time source
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock and delay backed by the embassy time driver
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl DelayNs for SystemClock {
    async fn delay_ns(&mut self, ns: u32) {
        Timer::after_nanos(u64::from(ns)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after_millis(u64::from(ms)).await;
    }
}

/// Tracks how long ago something last happened.
///
/// A fresh timer counts as already elapsed, so the first check after boot runs
/// immediately.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ElapsedTimer {
    last: Option<Instant>,
}

impl ElapsedTimer {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Time since the last [`reset`](Self::reset), or `None` if never reset.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last.map(|last| now.saturating_duration_since(last))
    }

    pub fn has_elapsed(&self, now: Instant, interval: Duration) -> bool {
        self.elapsed(now).is_none_or(|elapsed| elapsed >= interval)
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Reset and return true when `interval` has passed, otherwise leave the
    /// timer untouched.
    pub fn check_and_reset(&mut self, now: Instant, interval: Duration) -> bool {
        if self.has_elapsed(now, interval) {
            self.reset(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_timer_is_due() {
        let timer = ElapsedTimer::new();
        assert!(timer.has_elapsed(Instant::from_millis(0), Duration::from_secs(30)));
        assert_eq!(timer.elapsed(Instant::from_millis(10)), None);
    }

    #[test]
    fn test_check_and_reset_rate_limits() {
        let mut timer = ElapsedTimer::new();
        let interval = Duration::from_millis(1_000);

        assert!(timer.check_and_reset(Instant::from_millis(100), interval));
        assert!(!timer.check_and_reset(Instant::from_millis(600), interval));
        assert!(!timer.check_and_reset(Instant::from_millis(1_099), interval));
        assert!(timer.check_and_reset(Instant::from_millis(1_100), interval));
        assert_eq!(
            timer.elapsed(Instant::from_millis(1_350)),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_elapsed_saturates_when_clock_goes_backwards() {
        let mut timer = ElapsedTimer::new();
        timer.reset(Instant::from_millis(500));
        assert_eq!(timer.elapsed(Instant::from_millis(100)), Some(Duration::from_ticks(0)));
    }
}
