//! Clock and time types.
//!
//! This module provides:
//! - [`ClockTime`]: A nanosecond timestamp type (8 bytes, Copy)
//! - [`Clock`]: Trait for time sources, handed to nodes as a resource
//! - [`SystemClock`]: Monotonic system clock
//! - [`ManualClock`]: Clock that only moves when told to

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// ClockTime
// ============================================================================

/// Time in nanoseconds (8 bytes, Copy).
///
/// # Special Values
///
/// - `ClockTime::ZERO`: Zero time
/// - `ClockTime::NONE`: Invalid/unset time (sentinel value)
/// - `ClockTime::MAX`: Maximum representable time
///
/// # Examples
///
/// ```rust
/// use pipework::clock::ClockTime;
///
/// let t1 = ClockTime::from_secs(1);
/// let t2 = ClockTime::from_millis(500);
/// let t3 = t1 + t2;
///
/// assert_eq!(t3.millis(), 1500);
/// assert_eq!(format!("{}", t3), "1.500s");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    /// Zero time.
    pub const ZERO: Self = Self(0);

    /// Maximum representable time (one less than NONE sentinel).
    pub const MAX: Self = Self(u64::MAX - 1);

    /// Invalid/unset time (sentinel value).
    pub const NONE: Self = Self(u64::MAX);

    /// Create from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    /// Create from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us.saturating_mul(1_000))
    }

    /// Create from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// Create from seconds.
    #[inline]
    pub const fn from_secs(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// Get as nanoseconds.
    #[inline]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Get as microseconds (truncated).
    #[inline]
    pub const fn micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get as milliseconds (truncated).
    #[inline]
    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Get as seconds (truncated).
    #[inline]
    pub const fn secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Check if this is the NONE sentinel value.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Check if this is a valid time (not NONE).
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u64::MAX
    }

    /// Convert to Option, returning None for the NONE sentinel.
    #[inline]
    pub const fn to_option(self) -> Option<Self> {
        if self.is_none() { None } else { Some(self) }
    }

    /// Saturating addition. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        let result = self.0.saturating_add(rhs.0);
        // Don't overflow into NONE
        if result == u64::MAX {
            Self::MAX
        } else {
            Self(result)
        }
    }

    /// Saturating subtraction. Returns NONE if either operand is NONE.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        if self.is_none() || rhs.is_none() {
            return Self::NONE;
        }
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::Add for ClockTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for ClockTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for ClockTime {
    #[inline]
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(Self::MAX.0))
    }
}

impl From<ClockTime> for Duration {
    #[inline]
    fn from(t: ClockTime) -> Self {
        if t.is_none() {
            Duration::ZERO
        } else {
            Duration::from_nanos(t.0)
        }
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "NONE")
        } else {
            let secs = self.secs();
            let ms = (self.0 / 1_000_000) % 1000;
            write!(f, "{}.{:03}s", secs, ms)
        }
    }
}

// ============================================================================
// Clock Trait
// ============================================================================

/// A clock that provides the current time.
///
/// Implementations should provide monotonic time (never goes backwards).
/// Nodes obtain one through
/// [`ResourceKind::Clock`](crate::request::ResourceKind::Clock); once
/// published a clock is immutable from the node's point of view.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> ClockTime;

    /// Get a human-readable name for the clock.
    fn name(&self) -> &str {
        "unknown"
    }
}

// ============================================================================
// SystemClock
// ============================================================================

/// System monotonic clock.
///
/// Uses `std::time::Instant` for monotonic time measurement.
/// Time is relative to when the clock was created.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
    name: String,
}

impl SystemClock {
    /// Create a new system clock with the current instant as epoch.
    pub fn new() -> Self {
        Self::with_name("system-monotonic")
    }

    /// Create a system clock with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            epoch: Instant::now(),
            name: name.into(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> ClockTime {
        ClockTime::from(self.epoch.elapsed())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// ManualClock
// ============================================================================

/// Clock driven explicitly by its owner.
///
/// Handy for tests and for offline processing where time follows the data
/// rather than the wall clock. The owner keeps a handle to advance it while
/// nodes read it through the resource they were given.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: ClockTime) -> Self {
        Self {
            now: AtomicU64::new(start.nanos()),
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: ClockTime) {
        self.now.store(time.nanos(), Ordering::Release);
    }

    /// Move forward by `delta` and return the new time.
    pub fn advance(&self, delta: ClockTime) -> ClockTime {
        let prev = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |ns| {
                Some(ClockTime::from_nanos(ns).saturating_add(delta).nanos())
            })
            .unwrap_or_else(|ns| ns);
        ClockTime::from_nanos(prev).saturating_add(delta)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_nanos(self.now.load(Ordering::Acquire))
    }

    fn name(&self) -> &str {
        "manual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_constants() {
        assert!(ClockTime::NONE.is_none());
        assert!(ClockTime::ZERO.is_some());
        assert_eq!(ClockTime::NONE.to_option(), None);
    }

    #[test]
    fn test_clock_time_arithmetic() {
        let a = ClockTime::from_millis(1500);
        let b = ClockTime::from_millis(500);
        assert_eq!((a + b).secs(), 2);
        assert_eq!((a - b).millis(), 1000);
        assert_eq!(b - a, ClockTime::ZERO);
        assert!((a + ClockTime::NONE).is_none());
        assert_eq!(ClockTime::MAX + a, ClockTime::MAX);
    }

    #[test]
    fn test_clock_time_display() {
        assert_eq!(ClockTime::from_millis(2042).to_string(), "2.042s");
        assert_eq!(ClockTime::NONE.to_string(), "NONE");
    }

    #[test]
    fn test_duration_conversion() {
        let t = ClockTime::from(Duration::from_micros(250));
        assert_eq!(t.micros(), 250);
        assert_eq!(Duration::from(ClockTime::NONE), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
        assert_eq!(clock.name(), "system-monotonic");
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(ClockTime::from_secs(10));
        assert_eq!(clock.now().secs(), 10);

        let t = clock.advance(ClockTime::from_millis(250));
        assert_eq!(t.millis(), 10_250);
        assert_eq!(clock.now(), t);

        clock.set(ClockTime::ZERO);
        assert_eq!(clock.now(), ClockTime::ZERO);
    }
}
