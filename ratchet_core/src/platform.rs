// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-process kernel objects: ports, events, and event pairs.
//!
//! These model the handful of platform primitives the scheduling core relies
//! on:
//!
//! - [`Port`]: a packet queue drained by the run loop. Waits never call back
//!   into the waiter; they queue a packet on a port instead.
//! - [`Event`]: a one-way latch that may be signaled from any thread.
//! - [`EventPair`]: two linked endpoints with distinct koids. Each endpoint
//!   can observe when every handle to its peer (or to itself) has been
//!   closed. Duplicated handles share the endpoint's koid.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::id::Koid;

type Waiter = Box<dyn FnOnce() + Send>;

static NEXT_KOID: AtomicU64 = AtomicU64::new(1);

fn allocate_koid() -> Koid {
    Koid(NEXT_KOID.fetch_add(1, Ordering::Relaxed))
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// An unbounded packet queue owned by the run loop.
pub struct Port<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Port<T> {
    /// Creates an empty port.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Returns a handle that can queue packets on this port from any thread.
    #[must_use]
    pub fn sender(&self) -> PortSender<T> {
        PortSender {
            tx: self.tx.clone(),
        }
    }

    /// Removes the oldest packet, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for a packet.
    #[must_use]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Removes every packet currently queued, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    /// Number of packets waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no packets are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for Port<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("queued", &self.rx.len())
            .finish_non_exhaustive()
    }
}

/// Queues packets on a [`Port`].
pub struct PortSender<T> {
    tx: Sender<T>,
}

impl<T> PortSender<T> {
    /// Queues `packet`. Packets sent after the port is dropped are discarded.
    pub fn queue(&self, packet: T) {
        let _ = self.tx.send(packet);
    }
}

impl<T> Clone for PortSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for PortSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

struct EventState {
    signaled: bool,
    waiters: Vec<Waiter>,
}

struct EventInner {
    koid: Koid,
    state: Mutex<EventState>,
}

/// A latch that becomes signaled once and stays signaled.
///
/// Cloning duplicates the handle; all clones observe the same signal.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Creates an unsignaled event.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                koid: allocate_koid(),
                state: Mutex::new(EventState {
                    signaled: false,
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Returns the event's koid.
    #[must_use]
    pub fn koid(&self) -> Koid {
        self.inner.koid
    }

    /// Signals the event. Signaling twice is a no-op.
    pub fn signal(&self) {
        let waiters = {
            let mut state = self.inner.state.lock();
            if state.signaled {
                return;
            }
            state.signaled = true;
            core::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            waiter();
        }
    }

    /// Whether the event has been signaled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.inner.state.lock().signaled
    }

    /// Queues `packet` on `port` once the event is signaled, or right away if
    /// it already is.
    pub fn wait_async<T: Send + 'static>(&self, port: &PortSender<T>, packet: T) {
        let port = port.clone();
        self.on_signaled(Box::new(move || port.queue(packet)));
    }

    pub(crate) fn on_signaled(&self, waiter: Waiter) {
        let mut state = self.inner.state.lock();
        if state.signaled {
            drop(state);
            waiter();
        } else {
            state.waiters.push(waiter);
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("koid", &self.inner.koid)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventPair
// ---------------------------------------------------------------------------

struct EndpointState {
    handles: usize,
    closed_waiters: Vec<Waiter>,
}

struct Endpoint {
    koid: Koid,
    state: Mutex<EndpointState>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            koid: allocate_koid(),
            state: Mutex::new(EndpointState {
                handles: 1,
                closed_waiters: Vec::new(),
            }),
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().handles > 0
    }

    fn on_closed(&self, waiter: Waiter) {
        let mut state = self.state.lock();
        if state.handles == 0 {
            drop(state);
            waiter();
        } else {
            state.closed_waiters.push(waiter);
        }
    }
}

/// One endpoint of a linked pair of tokens.
///
/// The two endpoints of a pair have distinct koids; each knows the other's
/// koid as its [`related_koid`](Self::related_koid). Cloning duplicates the
/// handle; an endpoint closes when its last handle is dropped.
pub struct EventPair {
    ends: Arc<[Endpoint; 2]>,
    side: usize,
}

impl EventPair {
    /// Creates a linked pair of endpoints.
    #[must_use]
    pub fn create() -> (Self, Self) {
        let ends = Arc::new([Endpoint::new(), Endpoint::new()]);
        (
            Self {
                ends: Arc::clone(&ends),
                side: 0,
            },
            Self { ends, side: 1 },
        )
    }

    fn own(&self) -> &Endpoint {
        &self.ends[self.side]
    }

    fn peer(&self) -> &Endpoint {
        &self.ends[1 - self.side]
    }

    /// Koid of this endpoint.
    #[must_use]
    pub fn koid(&self) -> Koid {
        self.own().koid
    }

    /// Koid of the peer endpoint.
    #[must_use]
    pub fn related_koid(&self) -> Koid {
        self.peer().koid
    }

    /// Returns another handle to the same endpoint.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.own().state.lock().handles += 1;
        Self {
            ends: Arc::clone(&self.ends),
            side: self.side,
        }
    }

    /// Whether any handle to the peer endpoint is still open.
    #[must_use]
    pub fn peer_alive(&self) -> bool {
        self.peer().is_open()
    }

    /// Queues `packet` on `port` once every handle to the peer is closed, or
    /// right away if it already is.
    pub fn wait_peer_closed_async<T: Send + 'static>(&self, port: &PortSender<T>, packet: T) {
        let port = port.clone();
        self.peer().on_closed(Box::new(move || port.queue(packet)));
    }

    /// Queues `packet` on `port` once every handle to this endpoint,
    /// including `self`, is closed.
    pub fn wait_closed_async<T: Send + 'static>(&self, port: &PortSender<T>, packet: T) {
        let port = port.clone();
        self.own().on_closed(Box::new(move || port.queue(packet)));
    }
}

impl Clone for EventPair {
    fn clone(&self) -> Self {
        self.duplicate()
    }
}

impl Drop for EventPair {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.own().state.lock();
            state.handles -= 1;
            if state.handles > 0 {
                return;
            }
            core::mem::take(&mut state.closed_waiters)
        };
        for waiter in waiters {
            waiter();
        }
    }
}

impl fmt::Debug for EventPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPair")
            .field("koid", &self.koid())
            .field("related_koid", &self.related_koid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wait_queues_packet_on_signal() {
        let port = Port::new();
        let event = Event::new();
        event.wait_async(&port.sender(), 7_u32);
        assert!(port.is_empty(), "nothing queued before the signal");
        event.signal();
        event.signal();
        assert_eq!(port.drain().collect::<Vec<_>>(), vec![7], "exactly one packet");
    }

    #[test]
    fn event_wait_after_signal_queues_immediately() {
        let port = Port::new();
        let event = Event::new();
        let dup = event.clone();
        dup.signal();
        assert!(event.is_signaled(), "duplicates share the signal");
        assert_eq!(dup.koid(), event.koid(), "duplicates share a koid");
        event.wait_async(&port.sender(), "ready");
        assert_eq!(port.try_recv(), Some("ready"));
    }

    #[test]
    fn event_pair_koids_are_linked() {
        let (a, b) = EventPair::create();
        assert_ne!(a.koid(), b.koid());
        assert_eq!(a.related_koid(), b.koid());
        assert_eq!(b.related_koid(), a.koid());
        let a2 = a.duplicate();
        assert_eq!(a2.koid(), a.koid(), "duplicates share a koid");
    }

    #[test]
    fn peer_closes_after_last_handle() {
        let port = Port::new();
        let (a, b) = EventPair::create();
        let b2 = b.clone();
        a.wait_peer_closed_async(&port.sender(), 1_u8);
        drop(b);
        assert!(a.peer_alive(), "one handle to the peer remains");
        assert!(port.is_empty());
        drop(b2);
        assert!(!a.peer_alive());
        assert_eq!(port.try_recv(), Some(1));
    }

    #[test]
    fn wait_on_already_closed_peer_fires() {
        let port = Port::new();
        let (a, b) = EventPair::create();
        drop(b);
        a.wait_peer_closed_async(&port.sender(), ());
        assert_eq!(port.len(), 1);
    }

    #[test]
    fn wait_closed_tracks_own_handles() {
        let port = Port::new();
        let (a, b) = EventPair::create();
        a.wait_closed_async(&port.sender(), "a closed");
        let a2 = a.duplicate();
        drop(a);
        assert!(port.is_empty(), "a duplicate is still open");
        drop(a2);
        assert_eq!(port.try_recv(), Some("a closed"));
        assert!(!b.peer_alive());
    }
}
