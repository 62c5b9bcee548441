// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Time sources for the run loop.
//!
//! The scheduler never reads a clock itself; every operation that needs the
//! current time takes it as an argument. The [`Compositor`] obtains it from a
//! [`Clock`], which is either a [`SystemClock`] in production or a
//! [`ManualClock`] in tests and simulations.
//!
//! [`Compositor`]: crate::compositor::Compositor

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::time::{Duration, HostTime};

/// A monotonic source of [`HostTime`].
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> HostTime;
}

/// Wall-clock monotonic time measured from the clock's creation.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose zero is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> HostTime {
        let elapsed = self.origin.elapsed().as_nanos();
        HostTime(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

/// A virtual clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep a handle while
/// the compositor owns another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn new(start: HostTime) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(start.0)),
        }
    }

    /// Moves the clock to `time`. Going backwards is ignored.
    pub fn set(&self, time: HostTime) {
        self.nanos.fetch_max(time.0, Ordering::AcqRel);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.0, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> HostTime {
        HostTime(self.nanos.load(Ordering::Acquire))
    }
}
