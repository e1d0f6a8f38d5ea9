//! Time source abstraction
//!
//! Every time-dependent decision (windows, blocks, expiry, rotation) reads the
//! clock through this trait so tests can move time forward deterministically.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of the current UTC time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Longest interval any setting may span (ten years)
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// `secs` seconds, clamped to `0..=MAX_DURATION_SECS`
pub fn clamped_seconds(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_DURATION_SECS))
}

/// `millis` milliseconds, clamped to the same range
pub fn clamped_millis(millis: i64) -> Duration {
    Duration::milliseconds(millis.clamp(0, MAX_DURATION_SECS * 1_000))
}

/// `at + by`, saturating at the latest representable instant
pub fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock behind a shared handle
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        // Clones share the same underlying time
        let other = clock.clone();
        other.advance(Duration::seconds(10));
        assert_eq!(clock.now(), start + Duration::seconds(100));
    }

    #[test]
    fn test_durations_clamp_instead_of_panicking() {
        assert_eq!(clamped_seconds(i64::MAX), Duration::seconds(MAX_DURATION_SECS));
        assert_eq!(clamped_seconds(-5), Duration::zero());
        assert_eq!(clamped_millis(i64::MAX), Duration::seconds(MAX_DURATION_SECS));

        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert_eq!(saturating_add(late, Duration::days(30)), DateTime::<Utc>::MAX_UTC);
    }
}
