// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as tagged little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`], stopping at the first unknown tag or
//! truncated record.

use ratchet_core::id::SessionId;
use ratchet_core::time::HostTime;
use ratchet_core::trace::{
    FramePresentedEvent, FrameRenderedEvent, RenderBeginEvent, SessionTornDownEvent, TraceSink,
    UpdatesAppliedEvent, WakeupScheduledEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_WAKEUP_SCHEDULED: u8 = 1;
const TAG_UPDATES_APPLIED: u8 = 2;
const TAG_RENDER_BEGIN: u8 = 3;
const TAG_FRAME_RENDERED: u8 = 4;
const TAG_FRAME_PRESENTED: u8 = 5;
const TAG_SESSION_TORN_DOWN: u8 = 6;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_time(&mut self, t: HostTime) {
        self.write_u64(t.nanos());
    }

    fn write_option_time(&mut self, v: Option<HostTime>) {
        match v {
            Some(t) => {
                self.write_u8(1);
                self.write_time(t);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }
}

impl TraceSink for RecorderSink {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        self.write_u8(TAG_WAKEUP_SCHEDULED);
        self.write_time(e.now);
        self.write_time(e.wakeup_time);
        self.write_time(e.presentation_time);
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        self.write_u8(TAG_UPDATES_APPLIED);
        self.write_u64(e.frame_number);
        self.write_u32(e.sessions_due);
        self.write_u8(u8::from(e.needs_render));
        self.write_time(e.started_at);
        self.write_time(e.finished_at);
    }

    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        self.write_u8(TAG_RENDER_BEGIN);
        self.write_u64(e.frame_number);
        self.write_time(e.target_presentation_time);
        self.write_u32(e.outstanding_frames);
    }

    fn on_frame_rendered(&mut self, e: &FrameRenderedEvent) {
        self.write_u8(TAG_FRAME_RENDERED);
        self.write_u64(e.frame_number);
        self.write_time(e.render_done_time);
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        self.write_u8(TAG_FRAME_PRESENTED);
        self.write_u64(e.frame_number);
        self.write_option_time(e.actual_presentation_time);
        self.write_u32(e.notifications);
    }

    fn on_session_torn_down(&mut self, e: &SessionTornDownEvent) {
        self.write_u8(TAG_SESSION_TORN_DOWN);
        self.write_u64(e.session.get());
        self.write_u64(e.frame_number);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`WakeupScheduledEvent`].
    WakeupScheduled(WakeupScheduledEvent),
    /// An [`UpdatesAppliedEvent`].
    UpdatesApplied(UpdatesAppliedEvent),
    /// A [`RenderBeginEvent`].
    RenderBegin(RenderBeginEvent),
    /// A [`FrameRenderedEvent`].
    FrameRendered(FrameRenderedEvent),
    /// A [`FramePresentedEvent`].
    FramePresented(FramePresentedEvent),
    /// A [`SessionTornDownEvent`].
    SessionTornDown(SessionTornDownEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_option_time(&mut self) -> Option<Option<HostTime>> {
        let present = self.read_u8()?;
        let time = self.read_time()?;
        Some((present != 0).then_some(time))
    }

    fn decode_wakeup_scheduled(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::WakeupScheduled(WakeupScheduledEvent {
            now: self.read_time()?,
            wakeup_time: self.read_time()?,
            presentation_time: self.read_time()?,
        }))
    }

    fn decode_updates_applied(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::UpdatesApplied(UpdatesAppliedEvent {
            frame_number: self.read_u64()?,
            sessions_due: self.read_u32()?,
            needs_render: self.read_u8()? != 0,
            started_at: self.read_time()?,
            finished_at: self.read_time()?,
        }))
    }

    fn decode_render_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::RenderBegin(RenderBeginEvent {
            frame_number: self.read_u64()?,
            target_presentation_time: self.read_time()?,
            outstanding_frames: self.read_u32()?,
        }))
    }

    fn decode_frame_rendered(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameRendered(FrameRenderedEvent {
            frame_number: self.read_u64()?,
            render_done_time: self.read_time()?,
        }))
    }

    fn decode_frame_presented(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FramePresented(FramePresentedEvent {
            frame_number: self.read_u64()?,
            actual_presentation_time: self.read_option_time()?,
            notifications: self.read_u32()?,
        }))
    }

    fn decode_session_torn_down(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SessionTornDown(SessionTornDownEvent {
            session: SessionId(self.read_u64()?),
            frame_number: self.read_u64()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_WAKEUP_SCHEDULED => self.decode_wakeup_scheduled(),
            TAG_UPDATES_APPLIED => self.decode_updates_applied(),
            TAG_RENDER_BEGIN => self.decode_render_begin(),
            TAG_FRAME_RENDERED => self.decode_frame_rendered(),
            TAG_FRAME_PRESENTED => self.decode_frame_presented(),
            TAG_SESSION_TORN_DOWN => self.decode_session_torn_down(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
