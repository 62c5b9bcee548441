// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame timing records and presentation feedback.
//!
//! This module defines the types that flow between the scheduler, the
//! renderer, and clients:
//!
//! - [`VsyncTiming`]: the display's last vsync and refresh interval
//! - [`FrameTimings`]: the lifecycle of one rendered frame
//! - [`PresentationInfo`]: what a Present1 callback receives
//! - [`Present2Info`] / [`FramePresentedInfo`]: per-present records and their
//!   per-session coalesced form
//! - [`FuturePresentationInfo`]: a predicted latch point and presentation time
//!
//! # Data flow
//!
//! 1. At a wakeup the scheduler applies due session updates. Each applied
//!    present contributes a Present1 callback or a [`Present2Info`].
//! 2. If rendering starts, those records are attached to the frame and a
//!    [`FrameTimings`] is created.
//! 3. The renderer reports completion through the compositor
//!    (`on_frame_rendered`, then `on_frame_presented` or `on_frame_dropped`).
//! 4. On presentation [`VsyncTiming`] moves forward and every record attached
//!    so far is delivered to its client.

use crate::id::SessionId;
use crate::time::{Duration, HostTime};

/// Observed display timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VsyncTiming {
    /// Time of the most recent vsync known to the scheduler.
    pub last_vsync_time: HostTime,
    /// Interval between vsyncs.
    pub vsync_interval: Duration,
}

impl VsyncTiming {
    /// Creates timing anchored at `last_vsync_time`.
    #[must_use]
    pub const fn new(last_vsync_time: HostTime, vsync_interval: Duration) -> Self {
        Self {
            last_vsync_time,
            vsync_interval,
        }
    }

    /// Records an observed presentation. Older observations are ignored.
    pub fn observe_presentation(&mut self, actual: HostTime) {
        if actual > self.last_vsync_time {
            self.last_vsync_time = actual;
        }
    }
}

/// Lifecycle of one frame handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTimings {
    /// Scheduler frame counter.
    pub frame_number: u64,
    /// Presentation time the frame was rendered for.
    pub target_presentation_time: HostTime,
    /// Wakeup time at which updates were latched.
    pub latch_time: HostTime,
    /// When update application finished.
    pub update_done_time: HostTime,
    /// When rendering was started.
    pub render_start_time: HostTime,
    /// When the renderer finished, once known.
    pub render_done_time: Option<HostTime>,
    /// When the frame reached the display, once known.
    pub actual_presentation_time: Option<HostTime>,
    /// Whether the frame was dropped instead of presented.
    pub dropped: bool,
}

impl FrameTimings {
    /// Whether both render and presentation outcomes are known.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.dropped
            || (self.render_done_time.is_some() && self.actual_presentation_time.is_some())
    }

    /// Render duration, if the frame finished rendering.
    #[must_use]
    pub fn render_duration(&self) -> Option<Duration> {
        self.render_done_time
            .map(|done| done.saturating_duration_since(self.render_start_time))
    }

    /// How late the frame reached the display relative to its target. Zero
    /// when on time or early.
    #[must_use]
    pub fn presentation_delay(&self) -> Option<Duration> {
        self.actual_presentation_time
            .map(|actual| actual.saturating_duration_since(self.target_presentation_time))
    }
}

/// Delivered to a Present1 completion callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresentationInfo {
    /// When the frame containing the present reached the display.
    pub presentation_time: HostTime,
    /// Vsync interval at that time.
    pub presentation_interval: Duration,
    /// Presents the session may issue before hitting its budget.
    pub num_presents_allowed: u32,
}

/// Bookkeeping for one Present2 call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Present2Info {
    /// Session that presented.
    pub session: SessionId,
    /// When the present call was received.
    pub present_received_time: HostTime,
    /// When the update was latched into a frame, once applied.
    pub latched_time: Option<HostTime>,
}

/// Per-present entry of a [`FramePresentedInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresentReceivedInfo {
    /// When the present call was received.
    pub present_received_time: HostTime,
    /// When the update was latched into a frame.
    pub latched_time: HostTime,
}

/// All of one session's Present2 calls that reached the display in a frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FramePresentedInfo {
    /// When the frame reached the display.
    pub actual_presentation_time: HostTime,
    /// One entry per present, in present order.
    pub presentation_infos: Vec<PresentReceivedInfo>,
    /// Presents the session may issue before hitting its budget.
    pub num_presents_allowed: u32,
}

impl FramePresentedInfo {
    /// Coalesces one session's infos into a single notification.
    ///
    /// Infos that were never latched report their received time as the
    /// latch time.
    #[must_use]
    pub fn coalesce(
        infos: &[Present2Info],
        actual_presentation_time: HostTime,
        num_presents_allowed: u32,
    ) -> Self {
        debug_assert!(
            infos.windows(2).all(|w| w[0].session == w[1].session),
            "coalesced infos must belong to one session"
        );
        Self {
            actual_presentation_time,
            presentation_infos: infos
                .iter()
                .map(|info| PresentReceivedInfo {
                    present_received_time: info.present_received_time,
                    latched_time: info.latched_time.unwrap_or(info.present_received_time),
                })
                .collect(),
            num_presents_allowed,
        }
    }
}

/// A predicted future frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FuturePresentationInfo {
    /// Latest time an update can be latched to make this frame.
    pub latch_point: HostTime,
    /// When the frame is expected to reach the display.
    pub presentation_time: HostTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(received: u64, latched: Option<u64>) -> Present2Info {
        Present2Info {
            session: SessionId(1),
            present_received_time: HostTime(received),
            latched_time: latched.map(HostTime),
        }
    }

    #[test]
    fn coalesce_keeps_present_order() {
        let infos = [info(10, Some(30)), info(20, Some(30)), info(25, None)];
        let presented = FramePresentedInfo::coalesce(&infos, HostTime(50), 4);
        assert_eq!(presented.actual_presentation_time, HostTime(50));
        assert_eq!(presented.num_presents_allowed, 4);
        assert_eq!(
            presented
                .presentation_infos
                .iter()
                .map(|i| (i.present_received_time.0, i.latched_time.0))
                .collect::<Vec<_>>(),
            vec![(10, 30), (20, 30), (25, 25)],
            "order preserved, missing latch falls back to receive time"
        );
    }

    #[test]
    fn vsync_timing_only_moves_forward() {
        let mut vsync = VsyncTiming::new(HostTime(100), Duration(16));
        vsync.observe_presentation(HostTime(132));
        assert_eq!(vsync.last_vsync_time, HostTime(132));
        vsync.observe_presentation(HostTime(116));
        assert_eq!(vsync.last_vsync_time, HostTime(132), "stale feedback ignored");
    }

    #[test]
    fn frame_timings_derived_values() {
        let mut timings = FrameTimings {
            frame_number: 0,
            target_presentation_time: HostTime(100),
            latch_time: HostTime(80),
            update_done_time: HostTime(82),
            render_start_time: HostTime(82),
            render_done_time: None,
            actual_presentation_time: None,
            dropped: false,
        };
        assert!(!timings.is_finalized());
        assert_eq!(timings.render_duration(), None);

        timings.render_done_time = Some(HostTime(90));
        timings.actual_presentation_time = Some(HostTime(116));
        assert!(timings.is_finalized());
        assert_eq!(timings.render_duration(), Some(Duration(8)));
        assert_eq!(timings.presentation_delay(), Some(Duration(16)));
    }
}
