use alloc::rc::Rc;
use core::cell::Cell;
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;

use crate::time::Clock;

/// Virtual clock. Delays return immediately and move the clock forward.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now_us: Rc<Cell<u64>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_millis(&self, ms: u64) {
        self.now_us.set(ms * 1_000);
    }

    pub fn advance(&self, by: Duration) {
        self.now_us.set(self.now_us.get() + by.as_micros());
    }

    pub fn advance_millis(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn millis(&self) -> u64 {
        self.now_us.get() / 1_000
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_micros(self.now_us.get())
    }
}

impl DelayNs for MockClock {
    async fn delay_ns(&mut self, ns: u32) {
        self.now_us.set(self.now_us.get() + u64::from(ns).div_ceil(1_000));
    }

    async fn delay_us(&mut self, us: u32) {
        self.now_us.set(self.now_us.get() + u64::from(us));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.now_us.set(self.now_us.get() + u64::from(ms) * 1_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_delay_advances_shared_time() {
        let clock = MockClock::new();
        let mut delay = clock.clone();

        block_on(delay.delay_ms(250));
        block_on(delay.delay_us(500));
        clock.advance_millis(1_000);

        assert_eq!(clock.now(), Instant::from_micros(1_250_500));
        assert_eq!(clock.millis(), 1_250);
    }
}
