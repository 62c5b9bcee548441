// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time in nanoseconds.
//!
//! [`HostTime`] is a point on the compositor's monotonic timeline and
//! [`Duration`] a span on it. Both are plain nanosecond counts; the run loop
//! obtains the current value from a [`Clock`](crate::clock::Clock).
//!
//! Vsync arithmetic ([`HostTime::next_vsync_after`]) lives here because both
//! the predictor and the scheduler need the same rounding rules.
//!
//! All arithmetic, including the operator impls, saturates at the `u64`
//! bounds.

use core::fmt;
use core::ops::{Add, Sub};

use serde::Deserialize;

/// A point in time, in nanoseconds on the monotonic clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// The earliest representable time. Requests for this time are due
    /// immediately.
    pub const ZERO: Self = Self(0);

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    /// Saturating addition of a duration.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.0))
    }

    /// Saturating subtraction of a duration.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.0))
    }

    /// Returns the first vsync strictly after `last_vsync` that is at or
    /// after `self`.
    ///
    /// Vsyncs are assumed to recur every `interval` starting at
    /// `last_vsync`. A zero interval degenerates to `max(self, last_vsync)`.
    #[must_use]
    pub const fn next_vsync_after(self, last_vsync: Self, interval: Duration) -> Self {
        if interval.0 == 0 {
            return if self.0 > last_vsync.0 { self } else { last_vsync };
        }
        if self.0 <= last_vsync.0 {
            return Self(last_vsync.0.saturating_add(interval.0));
        }
        let elapsed = self.0 - last_vsync.0;
        let intervals = elapsed.div_ceil(interval.0);
        Self(last_vsync.0.saturating_add(intervals.saturating_mul(interval.0)))
    }
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Duration) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// A span of time in nanoseconds.
///
/// Deserializes from a bare integer so configuration files can write
/// `vsync_interval = 16666667`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(transparent)]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from whole microseconds.
    #[inline]
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Creates a duration from whole milliseconds.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction.
    #[inline]
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Returns this duration in fractional milliseconds, for logging.
    #[inline]
    #[must_use]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add for Duration {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_arithmetic() {
        let a = Duration(100);
        let b = Duration(30);
        assert_eq!((a + b).nanos(), 130);
        assert_eq!((a - b).nanos(), 70);
        assert_eq!(a.saturating_sub(Duration(200)), Duration::ZERO);
        assert_eq!(Duration::from_millis(2), Duration(2_000_000));
        assert_eq!(Duration::from_micros(5), Duration(5_000));
    }

    #[test]
    fn host_time_duration_ops() {
        let t = HostTime(1000);
        let d = Duration(200);
        assert_eq!((t + d).nanos(), 1200);
        assert_eq!((t - d).nanos(), 800);
        assert_eq!(t.saturating_duration_since(HostTime(1500)), Duration::ZERO);
        assert_eq!(t.saturating_duration_since(HostTime(400)), Duration(600));
        assert_eq!(HostTime(5).saturating_sub(Duration(10)), HostTime::ZERO);
    }

    #[test]
    fn operators_saturate() {
        assert_eq!(HostTime(u64::MAX - 1) + Duration(10), HostTime(u64::MAX));
        assert_eq!(HostTime(5) - Duration(10), HostTime::ZERO);
        assert_eq!(HostTime(5) - HostTime(10), Duration::ZERO, "no negative spans");
        assert_eq!(Duration(u64::MAX) + Duration(1), Duration(u64::MAX));
        assert_eq!(Duration(1) - Duration(2), Duration::ZERO);
    }

    #[test]
    fn next_vsync_rounds_up_to_interval() {
        let last = HostTime(1_000);
        let interval = Duration(100);
        assert_eq!(
            HostTime(1_000).next_vsync_after(last, interval),
            HostTime(1_100),
            "a time on the last vsync maps to the following one"
        );
        assert_eq!(HostTime(1_001).next_vsync_after(last, interval), HostTime(1_100));
        assert_eq!(HostTime(1_100).next_vsync_after(last, interval), HostTime(1_100));
        assert_eq!(HostTime(1_101).next_vsync_after(last, interval), HostTime(1_200));
        assert_eq!(
            HostTime(0).next_vsync_after(last, interval),
            HostTime(1_100),
            "times before the last vsync map to the next one"
        );
    }

    #[test]
    fn next_vsync_zero_interval() {
        assert_eq!(
            HostTime(50).next_vsync_after(HostTime(10), Duration::ZERO),
            HostTime(50)
        );
        assert_eq!(
            HostTime(5).next_vsync_after(HostTime(10), Duration::ZERO),
            HostTime(10)
        );
    }
}
