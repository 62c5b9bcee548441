// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in milliseconds.

use std::io::Write;

use ratchet_core::time::HostTime;
use ratchet_core::trace::{
    FramePresentedEvent, FrameRenderedEvent, RenderBeginEvent, SessionTornDownEvent, TraceSink,
    UpdatesAppliedEvent, WakeupScheduledEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its destination.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn ms(t: HostTime) -> f64 {
    t.nanos() as f64 / 1_000_000.0
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        let _ = writeln!(
            self.writer,
            "[wakeup] at={:.3}ms present={:.3}ms (now={:.3}ms)",
            ms(e.wakeup_time),
            ms(e.presentation_time),
            ms(e.now),
        );
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        let took = e.finished_at.saturating_duration_since(e.started_at);
        let _ = writeln!(
            self.writer,
            "[update] frame={} sessions={} render={} took={:.3}ms",
            e.frame_number,
            e.sessions_due,
            if e.needs_render { "yes" } else { "no" },
            took.as_millis_f64(),
        );
    }

    fn on_render_begin(&mut self, e: &RenderBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[render] frame={} target={:.3}ms in_flight={}",
            e.frame_number,
            ms(e.target_presentation_time),
            e.outstanding_frames,
        );
    }

    fn on_frame_rendered(&mut self, e: &FrameRenderedEvent) {
        let _ = writeln!(
            self.writer,
            "[rendered] frame={} at {:.3}ms",
            e.frame_number,
            ms(e.render_done_time),
        );
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        match e.actual_presentation_time {
            Some(actual) => {
                let _ = writeln!(
                    self.writer,
                    "[presented] frame={} at {:.3}ms notified={}",
                    e.frame_number,
                    ms(actual),
                    e.notifications,
                );
            }
            None => {
                let _ = writeln!(self.writer, "[dropped] frame={}", e.frame_number);
            }
        }
    }

    fn on_session_torn_down(&mut self, e: &SessionTornDownEvent) {
        let _ = writeln!(
            self.writer,
            "[teardown] session={} frame={}",
            e.session.get(),
            e.frame_number,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::id::SessionId;

    #[test]
    fn pretty_print_wakeup() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_wakeup_scheduled(&WakeupScheduledEvent {
            now: HostTime(0),
            wakeup_time: HostTime(11_000_000),
            presentation_time: HostTime(16_000_000),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert_eq!(output, "[wakeup] at=11.000ms present=16.000ms (now=0.000ms)\n");
    }

    #[test]
    fn dropped_frames_and_teardown() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_frame_presented(&FramePresentedEvent {
            frame_number: 4,
            actual_presentation_time: None,
            notifications: 0,
        });
        sink.on_session_torn_down(&SessionTornDownEvent {
            session: SessionId(2),
            frame_number: 4,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("[dropped] frame=4"), "got: {output}");
        assert!(output.contains("[teardown] session=2"), "got: {output}");
    }
}
