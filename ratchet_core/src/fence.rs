// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Acquire-fence sets that gate present requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::platform::{Event, PortSender};

/// A set of [`Event`]s that is ready once every event has been signaled.
///
/// An empty set is ready immediately. Readiness is sticky: signals cannot be
/// withdrawn, so once ready the set stays ready.
///
/// [`wait_ready_async`](Self::wait_ready_async) arms a one-shot notification:
/// a single packet reaches the port when the last fence fires. The packet is
/// always delivered through the port, even when the set is already ready at
/// arming time, so the caller never observes readiness re-entrantly.
#[derive(Debug, Default)]
pub struct SyncFenceSet {
    fences: Vec<Event>,
    armed: bool,
    observed: bool,
}

impl SyncFenceSet {
    /// Wraps `fences`.
    #[must_use]
    pub fn new(fences: Vec<Event>) -> Self {
        Self {
            fences,
            armed: false,
            observed: false,
        }
    }

    /// Number of fences in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether the set has no fences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Whether every fence has been signaled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.observed || self.fences.iter().all(Event::is_signaled)
    }

    /// Queues `packet` on `port` once the set is ready.
    ///
    /// Only the first call arms the notification; later calls are ignored.
    pub fn wait_ready_async<T: Send + 'static>(&mut self, port: &PortSender<T>, packet: T) {
        debug_assert!(!self.armed, "fence set armed twice");
        if self.armed {
            return;
        }
        self.armed = true;

        let pending: Vec<&Event> = self.fences.iter().filter(|f| !f.is_signaled()).collect();
        if pending.is_empty() {
            port.queue(packet);
            return;
        }

        let remaining = Arc::new(AtomicUsize::new(pending.len()));
        let slot = Arc::new(Mutex::new(Some((port.clone(), packet))));
        for fence in pending {
            let remaining = Arc::clone(&remaining);
            let slot = Arc::clone(&slot);
            fence.on_signaled(Box::new(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1
                    && let Some((port, packet)) = slot.lock().take()
                {
                    port.queue(packet);
                }
            }));
        }
    }

    /// Records that the owner has handled readiness.
    ///
    /// Returns `true` exactly once, on the first call made while the set is
    /// ready.
    pub fn observe_ready(&mut self) -> bool {
        if self.observed || !self.fences.iter().all(Event::is_signaled) {
            return false;
        }
        self.observed = true;
        true
    }
}
