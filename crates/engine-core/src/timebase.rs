use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
    start_unix_us: u64,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            start_unix_us: wall_clock_us(),
        }
    }

    /// Pin the wall-clock origin, for reproducible simulated timestamps.
    pub fn with_origin(start_unix_us: u64) -> Self {
        Self {
            start: Instant::now(),
            start_unix_us,
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch, anchored at start and
    /// advanced monotonically.
    pub fn unix_us(&self) -> u64 {
        self.start_unix_us.saturating_add(self.now_us())
    }

    /// Wall-clock timestamp of tick `tick` when ticks are `period` apart.
    pub fn tick_unix_us(&self, tick: u64, period: Duration) -> u64 {
        let offset = (period.as_micros() as u64).saturating_mul(tick);
        self.start_unix_us.saturating_add(offset)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_timestamps_are_spaced_by_period() {
        let tb = TimeBase::with_origin(1_000_000);
        assert_eq!(tb.tick_unix_us(0, Duration::from_millis(500)), 1_000_000);
        assert_eq!(tb.tick_unix_us(4, Duration::from_millis(500)), 3_000_000);
    }

    #[test]
    fn unix_clock_is_monotonic() {
        let tb = TimeBase::new();
        let a = tb.unix_us();
        let b = tb.unix_us();
        assert!(b >= a);
    }
}
