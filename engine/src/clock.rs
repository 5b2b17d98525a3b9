//! Monotonic time sources.
//!
//! The frame driver, hover debounce and haptic ramps read time through
//! `Clock` so tests can step frames deterministically with `TestClock`.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of monotonic instants.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Seconds elapsed between `earlier` and now, saturating at zero.
    fn secs_since(&self, earlier: Instant) -> f32 {
        self.now().saturating_duration_since(earlier).as_secs_f32()
    }
}

/// Real monotonic time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually stepped clock for simulations and tests.
#[derive(Debug)]
pub struct TestClock {
    instant: Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            instant: Mutex::new(Instant::now()),
        }
    }

    /// Advance time by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.instant.lock() += duration;
    }

    /// Advance time by a frame delta in seconds. Negative values are ignored.
    pub fn advance_secs(&self, secs: f32) {
        if secs.is_finite() && secs > 0.0 {
            self.advance(Duration::from_secs_f32(secs));
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.instant.lock()
    }
}
