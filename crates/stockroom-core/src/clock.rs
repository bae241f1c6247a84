//! # Clock
//!
//! Token expiry and rate-limit windows are both computed against "now".
//! Every consumer takes a [`SharedClock`] instead of calling `Utc::now()`
//! directly so tests can move time deterministically.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// 2026-01-01T00:00:00Z
const EPOCH_SECS: i64 = 1_767_225_600;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Reference-counted clock handle shared across the service.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// A shared handle to the system clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a test can keep one handle
/// and hand another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Start at a fixed, whole-second instant.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or_default())
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    /// A shared handle observing the same instant as `self`.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::at_epoch();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::seconds(61));
        assert_eq!(clock.now() - t0, Duration::seconds(61));
    }

    #[test]
    fn shared_handles_observe_the_same_instant() {
        let clock = ManualClock::at_epoch();
        let shared = clock.shared();
        clock.advance(Duration::minutes(5));
        assert_eq!(shared.now(), clock.now());
    }

    #[test]
    fn at_epoch_is_whole_second() {
        let clock = ManualClock::at_epoch();
        assert_eq!(clock.now().timestamp_subsec_nanos(), 0);
        assert_eq!(clock.now().timestamp(), EPOCH_SECS);
    }

    #[test]
    fn set_jumps_to_absolute_instant() {
        let clock = ManualClock::at_epoch();
        let target = clock.now() + Duration::hours(3);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn system_clock_is_close_to_utc_now() {
        let drift = (SystemClock.now() - Utc::now()).num_seconds().abs();
        assert!(drift <= 1);
    }
}
