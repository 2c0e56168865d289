//! Time abstraction for deterministic testing
//!
//! Production code takes a [`Clock`] so tests can drive expiry and timeout
//! behavior without real delays.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Trait for time operations
pub trait Clock: Send + Sync + 'static {
    /// Current instant (monotonic time).
    fn now(&self) -> Instant;

    /// Current system time (wall clock).
    fn system_time(&self) -> SystemTime;

    /// Wall clock as a UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }
}

/// Real system clock for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock whose time only moves when a test advances it
#[derive(Debug, Clone)]
pub struct MockClock {
    start_instant: Instant,
    start_system: SystemTime,
    advanced: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// A mock clock anchored at the current wall-clock time.
    pub fn new() -> Self {
        Self::anchored_at(SystemTime::now())
    }

    /// A mock clock anchored at a specific wall-clock time.
    pub fn anchored_at(start_system: SystemTime) -> Self {
        Self {
            start_instant: Instant::now(),
            start_system,
            advanced: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock without sleeping.
    pub fn advance(&self, by: Duration) {
        *self.advanced.lock() += by;
    }

    /// How far the clock has been advanced in total.
    pub fn advanced_total(&self) -> Duration {
        *self.advanced.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start_instant + *self.advanced.lock()
    }

    fn system_time(&self) -> SystemTime {
        self.start_system + *self.advanced.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_only_moves_when_advanced() {
        let clock = MockClock::new();
        let before = clock.now_utc();
        assert_eq!(before, clock.now_utc());

        clock.advance(Duration::from_secs(90));
        let after = clock.now_utc();
        assert_eq!((after - before).num_seconds(), 90);
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
