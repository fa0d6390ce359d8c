//! Host clock abstraction
//!
//! "Begin at instant X" commands are expressed on a monotonic host clock so
//! that wall-clock adjustments never shift a scheduled start. `HostTime` is an
//! offset from the clock's origin; both pipelines and the engine must share
//! the same clock instance.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Instant on the host clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(Duration);

impl HostTime {
    /// Clock origin
    pub const ZERO: HostTime = HostTime(Duration::ZERO);

    pub fn from_duration(since_origin: Duration) -> Self {
        HostTime(since_origin)
    }

    pub fn from_millis(ms: u64) -> Self {
        HostTime(Duration::from_millis(ms))
    }

    /// Offset from the clock origin
    pub fn since_origin(&self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future
    pub fn saturating_duration_since(&self, earlier: HostTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for HostTime {
    type Output = HostTime;

    fn add(self, rhs: Duration) -> HostTime {
        HostTime(self.0 + rhs)
    }
}

impl Sub<HostTime> for HostTime {
    type Output = Duration;

    /// Saturates at zero
    fn sub(self, rhs: HostTime) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl std::fmt::Display for HostTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}ms", self.0.as_secs_f64() * 1000.0)
    }
}

/// Monotonic clock used to express future start instants
pub trait HostClock: Send + Sync {
    fn now(&self) -> HostTime;
}

/// Host clock backed by `tokio::time::Instant`
///
/// Follows tokio's clock, so a paused test runtime freezes it too.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for MonotonicClock {
    fn now(&self) -> HostTime {
        HostTime(self.origin.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arithmetic() {
        let now = HostTime::from_millis(1_000);
        let visual = now + Duration::from_millis(50);
        let audio = visual + Duration::from_millis(40);

        assert_eq!(audio - now, Duration::from_millis(90));
        assert_eq!(now - audio, Duration::ZERO);
        assert!(audio > visual);
        assert_eq!(visual.to_string(), "1050.000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_tokio_time() {
        let clock = MonotonicClock::new();
        let before = clock.now();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(clock.now() - before, Duration::from_millis(250));
    }
}
