// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! the scheduler calls at each stage of a frame. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! This is separate from the `tracing` log output: sinks receive typed
//! records suitable for recording and replay.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).

use crate::id::SessionId;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the scheduler picks a new wakeup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WakeupScheduledEvent {
    /// Time of the request.
    pub now: HostTime,
    /// When the scheduler will wake up (the latch point).
    pub wakeup_time: HostTime,
    /// Presentation time the wakeup is aiming for.
    pub presentation_time: HostTime,
}

/// Emitted after due sessions were updated at a wakeup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdatesAppliedEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// Number of sessions that were due.
    pub sessions_due: u32,
    /// Whether any session asked for a render.
    pub needs_render: bool,
    /// When update application started.
    pub started_at: HostTime,
    /// When update application finished.
    pub finished_at: HostTime,
}

/// Emitted when a frame is handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderBeginEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// Presentation time the frame targets.
    pub target_presentation_time: HostTime,
    /// Frames in flight before this one.
    pub outstanding_frames: u32,
}

/// Emitted when the renderer reports completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRenderedEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// When rendering finished.
    pub render_done_time: HostTime,
}

/// Emitted when a frame reaches the display or is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePresentedEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// Actual presentation time, or `None` if dropped.
    pub actual_presentation_time: Option<HostTime>,
    /// Number of Present1 callbacks and Present2 sessions notified.
    pub notifications: u32,
}

/// Emitted when a session is torn down after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTornDownEvent {
    /// The session.
    pub session: SessionId,
    /// Frame during which it was torn down.
    pub frame_number: u64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a wakeup is scheduled.
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        _ = e;
    }

    /// Called after session updates were applied.
    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        _ = e;
    }

    /// Called when rendering of a frame begins.
    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        _ = e;
    }

    /// Called when a frame finished rendering.
    fn on_frame_rendered(&mut self, e: &FrameRenderedEvent) {
        _ = e;
    }

    /// Called when a frame was presented or dropped.
    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        _ = e;
    }

    /// Called when a session is torn down.
    fn on_session_torn_down(&mut self, e: &SessionTornDownEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`WakeupScheduledEvent`].
    #[inline]
    pub fn wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_wakeup_scheduled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`UpdatesAppliedEvent`].
    #[inline]
    pub fn updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_updates_applied(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RenderBeginEvent`].
    #[inline]
    pub fn render_begin(&mut self, e: &RenderBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_render_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameRenderedEvent`].
    #[inline]
    pub fn frame_rendered(&mut self, e: &FrameRenderedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_rendered(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FramePresentedEvent`].
    #[inline]
    pub fn frame_presented(&mut self, e: &FramePresentedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_presented(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`SessionTornDownEvent`].
    #[inline]
    pub fn session_torn_down(&mut self, e: &SessionTornDownEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_session_torn_down(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        wakeups: u32,
        torn_down: Vec<SessionId>,
    }

    impl TraceSink for Counter {
        fn on_wakeup_scheduled(&mut self, _e: &WakeupScheduledEvent) {
            self.wakeups += 1;
        }

        fn on_session_torn_down(&mut self, e: &SessionTornDownEvent) {
            self.torn_down.push(e.session);
        }
    }

    fn emit_all(tracer: &mut Tracer<'_>) {
        tracer.wakeup_scheduled(&WakeupScheduledEvent {
            now: HostTime(0),
            wakeup_time: HostTime(10),
            presentation_time: HostTime(16),
        });
        tracer.render_begin(&RenderBeginEvent {
            frame_number: 0,
            target_presentation_time: HostTime(16),
            outstanding_frames: 0,
        });
        tracer.session_torn_down(&SessionTornDownEvent {
            session: SessionId(3),
            frame_number: 0,
        });
    }

    #[test]
    fn none_tracer_is_silent() {
        let mut tracer = Tracer::none();
        emit_all(&mut tracer);
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        let mut tracer = Tracer::new(&mut sink);
        emit_all(&mut tracer);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        let mut counter = Counter::default();
        {
            let mut tracer = Tracer::new(&mut counter);
            emit_all(&mut tracer);
        }
        assert_eq!(counter.wakeups, 1, "one wakeup emitted");
        assert_eq!(counter.torn_down, vec![SessionId(3)]);
    }

    #[cfg(not(feature = "trace"))]
    #[test]
    fn tracer_compiles_out_without_feature() {
        let mut counter = Counter::default();
        {
            let mut tracer = Tracer::new(&mut counter);
            emit_all(&mut tracer);
        }
        assert_eq!(counter.wakeups, 0, "events are dropped without `trace`");
        assert!(counter.torn_down.is_empty(), "events are dropped without `trace`");
    }
}
