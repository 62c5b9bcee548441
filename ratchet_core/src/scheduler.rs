// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame scheduling: when to wake up, when to render, who to notify.
//!
//! The [`FrameScheduler`] collects "session S wants to be considered at time
//! T" requests in a min-heap, predicts a latch point for the earliest of them
//! and exposes it as [`next_wakeup`](FrameScheduler::next_wakeup). The owner
//! calls [`on_wakeup`](FrameScheduler::on_wakeup) once that time has come.
//!
//! # Frame lifecycle
//!
//! ```text
//!   Idle ──schedule_update_for_session──► WakeupPending
//!     ▲                                        │ on_wakeup
//!     │                                        ▼
//!     │        render_pending ◄──full── Updating ──nothing to do──► Idle
//!     │                                        │
//!     │                                        ▼
//!     └──────── on_frame_presented ◄──── Rendering
//! ```
//!
//! At most [`SchedulerConfig::max_outstanding_frames`] frames are in flight
//! between `render_frame` and `on_frame_presented`. When the limit is hit the
//! render is latched as pending and retried as soon as a frame retires.
//!
//! Completion records of applied presents ride with the frame that first
//! contains them and are delivered when it is presented. A dropped frame
//! passes its records on to the next frame.

use core::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::id::SessionId;
use crate::platform::Event;
use crate::predictor::{FramePredictor, PredictionRequest};
use crate::session::Present1Callback;
use crate::time::{Duration, HostTime};
use crate::timing::{
    FramePresentedInfo, FrameTimings, FuturePresentationInfo, Present2Info, PresentationInfo,
    VsyncTiming,
};
use crate::trace::{
    FramePresentedEvent, FrameRenderedEvent, RenderBeginEvent, SessionTornDownEvent, Tracer,
    UpdatesAppliedEvent, WakeupScheduledEvent,
};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Receives a session's coalesced Present2 notifications.
pub type FramePresentedCallback = Box<dyn FnMut(FramePresentedInfo)>;

/// What [`SessionUpdater::update_sessions`] reports back.
#[derive(Default)]
pub struct UpdateResults {
    /// Whether anything changed that requires a new frame.
    pub needs_render: bool,
    /// Present1 completion callbacks of applied presents.
    pub present1_callbacks: Vec<(SessionId, Present1Callback)>,
    /// Present2 records of applied presents, in apply order.
    pub present2_infos: Vec<Present2Info>,
    /// Release fences to signal once the next frame is on screen.
    pub release_fences: Vec<Event>,
    /// Sessions torn down because an update failed to apply.
    pub sessions_torn_down: Vec<SessionId>,
}

impl fmt::Debug for UpdateResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateResults")
            .field("needs_render", &self.needs_render)
            .field("present1_callbacks", &self.present1_callbacks.len())
            .field("present2_infos", &self.present2_infos)
            .field("release_fences", &self.release_fences.len())
            .field("sessions_torn_down", &self.sessions_torn_down)
            .finish()
    }
}

/// Applies session updates on behalf of the scheduler.
pub trait SessionUpdater {
    /// Applies the due updates of `sessions`.
    fn update_sessions(
        &mut self,
        sessions: &BTreeSet<SessionId>,
        target_presentation_time: HostTime,
        latched_time: HostTime,
        frame_number: u64,
    ) -> UpdateResults;

    /// Called right before a frame is rendered.
    fn prepare_frame(&mut self, presentation_time: HostTime, frame_number: u64) {
        _ = (presentation_time, frame_number);
    }

    /// Returns credit for `count` presents of `session` that reached the
    /// display. Returns the session's refreshed present allowance, or `None`
    /// if the session no longer exists.
    fn on_presents_completed(&mut self, session: SessionId, count: u32) -> Option<u32>;
}

/// Result of [`FrameRenderer::render_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderOutcome {
    /// Rendering was initiated; completion is reported later.
    Rendered,
    /// Rendering failed. The frame is not retried.
    Failed,
    /// There was nothing to draw.
    NoContent,
}

/// Starts rendering frames on behalf of the scheduler.
pub trait FrameRenderer {
    /// Renders a frame for `presentation_time`.
    fn render_frame(&mut self, timings: &FrameTimings, presentation_time: HostTime)
    -> RenderOutcome;
}

// ---------------------------------------------------------------------------
// FrameScheduler
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Wakeup {
    wakeup_time: HostTime,
    presentation_time: HostTime,
}

/// Completion records travelling with a frame.
#[derive(Default)]
struct FrameCallbacks {
    present1: Vec<(SessionId, Present1Callback)>,
    present2: Vec<Present2Info>,
    release_fences: Vec<Event>,
}

impl FrameCallbacks {
    fn append(&mut self, mut other: Self) {
        self.present1.append(&mut other.present1);
        self.present2.append(&mut other.present2);
        self.release_fences.append(&mut other.release_fences);
    }

    fn prepend(&mut self, earlier: Self) {
        let later = core::mem::replace(self, earlier);
        self.append(later);
    }
}

struct OutstandingFrame {
    timings: FrameTimings,
    callbacks: FrameCallbacks,
}

/// Decides when sessions are updated and frames are rendered.
pub struct FrameScheduler {
    config: SchedulerConfig,
    vsync: VsyncTiming,
    predictor: FramePredictor,
    updatable_sessions: BinaryHeap<Reverse<(HostTime, SessionId)>>,
    outstanding_frames: VecDeque<OutstandingFrame>,
    pending_callbacks: FrameCallbacks,
    present2_callbacks: HashMap<SessionId, FramePresentedCallback>,
    wakeup: Option<Wakeup>,
    frame_number: u64,
    render_continuously: bool,
    render_pending: bool,
    last_presented: Option<FrameTimings>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("config", &self.config)
            .field("vsync", &self.vsync)
            .field("predictor", &self.predictor)
            .field("updatable_sessions", &self.updatable_sessions.len())
            .field("outstanding_frames", &self.outstanding_frames.len())
            .field("wakeup", &self.wakeup)
            .field("frame_number", &self.frame_number)
            .field("render_continuously", &self.render_continuously)
            .field("render_pending", &self.render_pending)
            .finish_non_exhaustive()
    }
}

impl FrameScheduler {
    /// Creates a scheduler whose vsync grid is anchored at `start`.
    #[must_use]
    pub fn new(config: SchedulerConfig, start: HostTime) -> Self {
        Self {
            vsync: VsyncTiming::new(start, config.vsync_interval),
            predictor: FramePredictor::new(&config),
            config,
            updatable_sessions: BinaryHeap::new(),
            outstanding_frames: VecDeque::new(),
            pending_callbacks: FrameCallbacks::default(),
            present2_callbacks: HashMap::new(),
            wakeup: None,
            frame_number: 0,
            render_continuously: false,
            render_pending: false,
            last_presented: None,
        }
    }

    /// Asks for `session` to be considered at the first wakeup whose target
    /// presentation time is at or after `presentation_time`.
    pub fn schedule_update_for_session(
        &mut self,
        now: HostTime,
        presentation_time: HostTime,
        session: SessionId,
        tracer: &mut Tracer<'_>,
    ) {
        self.updatable_sessions
            .push(Reverse((presentation_time, session)));
        self.request_frame(now, tracer);
    }

    /// Renders a frame every vsync while enabled, whether or not anything
    /// changed.
    pub fn set_render_continuously(&mut self, now: HostTime, enabled: bool, tracer: &mut Tracer<'_>) {
        self.render_continuously = enabled;
        if enabled {
            self.request_frame(now, tracer);
        }
    }

    /// Registers the Present2 notification callback of `session`.
    pub fn set_on_frame_presented_callback(
        &mut self,
        session: SessionId,
        callback: FramePresentedCallback,
    ) {
        self.present2_callbacks.insert(session, callback);
    }

    /// Forgets the callbacks of `session`. Pending heap entries are kept and
    /// resolve as a missing session at their wakeup.
    pub fn remove_session(&mut self, session: SessionId) {
        self.present2_callbacks.remove(&session);
    }

    /// When the scheduler next wants [`on_wakeup`](Self::on_wakeup) called.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<HostTime> {
        self.wakeup.map(|w| w.wakeup_time)
    }

    /// Presentation time the pending wakeup aims for.
    #[must_use]
    pub fn next_presentation_time(&self) -> Option<HostTime> {
        self.wakeup.map(|w| w.presentation_time)
    }

    /// Number of frames rendered but not yet presented.
    #[must_use]
    pub fn num_outstanding_frames(&self) -> usize {
        self.outstanding_frames.len()
    }

    /// Whether a render is waiting for an outstanding frame to retire.
    #[must_use]
    pub fn render_pending(&self) -> bool {
        self.render_pending
    }

    /// Number of the next frame to be rendered.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Current vsync estimate.
    #[must_use]
    pub fn vsync(&self) -> VsyncTiming {
        self.vsync
    }

    /// The duration predictor.
    #[must_use]
    pub fn predictor(&self) -> &FramePredictor {
        &self.predictor
    }

    /// Timings of the most recently retired frame.
    #[must_use]
    pub fn last_presented_timings(&self) -> Option<&FrameTimings> {
        self.last_presented.as_ref()
    }

    fn request_frame(&mut self, now: HostTime, tracer: &mut Tracer<'_>) {
        let requested_presentation_time = if self.render_continuously || self.render_pending {
            HostTime::ZERO
        } else {
            match self.updatable_sessions.peek() {
                Some(Reverse((time, _))) => *time,
                None => HostTime::ZERO,
            }
        };
        let times = self.predictor.get_prediction(&PredictionRequest {
            now,
            requested_presentation_time,
            last_vsync_time: self.vsync.last_vsync_time,
            vsync_interval: self.vsync.vsync_interval,
        });
        if self
            .wakeup
            .is_some_and(|w| w.wakeup_time <= times.latch_point_time)
        {
            return;
        }
        self.wakeup = Some(Wakeup {
            wakeup_time: times.latch_point_time,
            presentation_time: times.presentation_time,
        });
        debug!(
            ?now,
            wakeup = ?times.latch_point_time,
            presentation = ?times.presentation_time,
            "wakeup scheduled"
        );
        tracer.wakeup_scheduled(&WakeupScheduledEvent {
            now,
            wakeup_time: times.latch_point_time,
            presentation_time: times.presentation_time,
        });
    }

    /// Runs the pending wakeup: updates due sessions and renders if needed.
    ///
    /// Does nothing if no wakeup is pending. The caller decides when the
    /// wakeup time has come.
    pub fn on_wakeup<E>(&mut self, clock: &dyn Clock, engine: &mut E, tracer: &mut Tracer<'_>)
    where
        E: SessionUpdater + FrameRenderer,
    {
        let Some(wakeup) = self.wakeup.take() else {
            return;
        };
        let target = wakeup.presentation_time;
        let latched = wakeup.wakeup_time;

        let mut due = BTreeSet::new();
        while let Some(&Reverse((time, session))) = self.updatable_sessions.peek() {
            if time > target {
                break;
            }
            self.updatable_sessions.pop();
            due.insert(session);
        }

        let update_start = clock.now();
        let results = engine.update_sessions(&due, target, latched, self.frame_number);
        let update_done = clock.now();
        self.predictor
            .report_update_duration(update_done.saturating_duration_since(update_start));
        tracer.updates_applied(&UpdatesAppliedEvent {
            frame_number: self.frame_number,
            sessions_due: u32::try_from(due.len()).unwrap_or(u32::MAX),
            needs_render: results.needs_render,
            started_at: update_start,
            finished_at: update_done,
        });

        for session in &results.sessions_torn_down {
            self.remove_session(*session);
            tracer.session_torn_down(&SessionTornDownEvent {
                session: *session,
                frame_number: self.frame_number,
            });
        }
        self.pending_callbacks.append(FrameCallbacks {
            present1: results.present1_callbacks,
            present2: results.present2_infos,
            release_fences: results.release_fences,
        });

        if !results.needs_render && !self.render_pending && !self.render_continuously {
            if !self.updatable_sessions.is_empty() {
                self.request_frame(update_done, tracer);
            }
            return;
        }

        let limit = usize::try_from(self.config.max_outstanding_frames).unwrap_or(usize::MAX);
        if self.outstanding_frames.len() >= limit {
            debug!(
                outstanding = self.outstanding_frames.len(),
                "too many frames in flight, render deferred"
            );
            self.render_pending = true;
            return;
        }

        engine.prepare_frame(target, self.frame_number);
        let render_start = clock.now();
        let timings = FrameTimings {
            frame_number: self.frame_number,
            target_presentation_time: target,
            latch_time: latched,
            update_done_time: update_done,
            render_start_time: render_start,
            render_done_time: None,
            actual_presentation_time: None,
            dropped: false,
        };
        tracer.render_begin(&RenderBeginEvent {
            frame_number: self.frame_number,
            target_presentation_time: target,
            outstanding_frames: u32::try_from(self.outstanding_frames.len()).unwrap_or(u32::MAX),
        });

        self.render_pending = false;
        match engine.render_frame(&timings, target) {
            RenderOutcome::Rendered => {
                self.outstanding_frames.push_back(OutstandingFrame {
                    timings,
                    callbacks: core::mem::take(&mut self.pending_callbacks),
                });
            }
            RenderOutcome::Failed => {
                warn!(frame_number = self.frame_number, "render failed");
            }
            RenderOutcome::NoContent => {
                let callbacks = core::mem::take(&mut self.pending_callbacks);
                let notified = self.deliver(callbacks, target, engine);
                debug!(frame_number = self.frame_number, notified, "nothing to render");
            }
        }

        self.frame_number += 1;
        if !self.updatable_sessions.is_empty() {
            self.request_frame(update_done, tracer);
        }
    }

    /// Records that the renderer finished frame `frame_number`.
    pub fn on_frame_rendered(
        &mut self,
        frame_number: u64,
        render_done_time: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        let Some(frame) = self
            .outstanding_frames
            .iter_mut()
            .find(|f| f.timings.frame_number == frame_number)
        else {
            debug!(frame_number, "render completion for unknown frame");
            return;
        };
        frame.timings.render_done_time = Some(render_done_time);
        if let Some(duration) = frame.timings.render_duration() {
            self.predictor.report_render_duration(duration);
        }
        tracer.frame_rendered(&FrameRenderedEvent {
            frame_number,
            render_done_time,
        });
    }

    /// Retires frame `frame_number`, which reached the display at
    /// `actual_presentation_time`, or was dropped if that is `None`.
    ///
    /// Frames must be retired in the order they were rendered. Returns
    /// `false` and changes nothing if `frame_number` is not the oldest
    /// outstanding frame.
    pub fn on_frame_presented<U>(
        &mut self,
        now: HostTime,
        frame_number: u64,
        actual_presentation_time: Option<HostTime>,
        updater: &mut U,
        tracer: &mut Tracer<'_>,
    ) -> bool
    where
        U: SessionUpdater + ?Sized,
    {
        let in_order = self
            .outstanding_frames
            .front()
            .is_some_and(|f| f.timings.frame_number == frame_number);
        if !in_order {
            warn!(frame_number, "presentation feedback out of order");
            return false;
        }
        let Some(OutstandingFrame {
            mut timings,
            callbacks,
        }) = self.outstanding_frames.pop_front()
        else {
            return false;
        };

        let notifications = match actual_presentation_time {
            Some(actual) => {
                timings.actual_presentation_time = Some(actual);
                self.vsync.observe_presentation(actual);
                self.deliver(callbacks, actual, updater)
            }
            None => {
                timings.dropped = true;
                match self.outstanding_frames.front_mut() {
                    Some(next) => next.callbacks.prepend(callbacks),
                    None => self.pending_callbacks.prepend(callbacks),
                }
                // The dropped content still has to reach the screen.
                self.render_pending = true;
                0
            }
        };
        debug!(
            frame_number,
            actual = ?actual_presentation_time,
            notifications,
            "frame retired"
        );
        tracer.frame_presented(&FramePresentedEvent {
            frame_number,
            actual_presentation_time,
            notifications,
        });
        self.last_presented = Some(timings);

        if self.render_continuously || self.render_pending {
            self.request_frame(now, tracer);
        }
        true
    }

    fn deliver<U>(
        &mut self,
        callbacks: FrameCallbacks,
        presentation_time: HostTime,
        updater: &mut U,
    ) -> u32
    where
        U: SessionUpdater + ?Sized,
    {
        let presentation_interval = self.vsync.vsync_interval;
        let mut notified = 0_u32;

        for (session, callback) in callbacks.present1 {
            let Some(num_presents_allowed) = updater.on_presents_completed(session, 1) else {
                continue;
            };
            callback(PresentationInfo {
                presentation_time,
                presentation_interval,
                num_presents_allowed,
            });
            notified += 1;
        }

        let mut by_session: BTreeMap<SessionId, Vec<Present2Info>> = BTreeMap::new();
        for info in callbacks.present2 {
            by_session.entry(info.session).or_default().push(info);
        }
        for (session, infos) in by_session {
            let count = u32::try_from(infos.len()).unwrap_or(u32::MAX);
            let Some(num_presents_allowed) = updater.on_presents_completed(session, count) else {
                continue;
            };
            if let Some(callback) = self.present2_callbacks.get_mut(&session) {
                callback(FramePresentedInfo::coalesce(
                    &infos,
                    presentation_time,
                    num_presents_allowed,
                ));
                notified += 1;
            }
        }

        for fence in callbacks.release_fences {
            fence.signal();
        }
        notified
    }

    /// Predicts the frames that will be presented within `span` of `now`.
    ///
    /// Returns at most [`SchedulerConfig::max_prediction_count`] entries with
    /// strictly increasing presentation times. Each latch point is at or
    /// after `now` and before its presentation time.
    #[must_use]
    pub fn get_future_presentation_infos(
        &self,
        now: HostTime,
        span: Duration,
    ) -> Vec<FuturePresentationInfo> {
        let limit = now.saturating_add(span);
        let max = usize::try_from(self.config.max_prediction_count).unwrap_or(usize::MAX);
        let interval = self.vsync.vsync_interval;
        let mut last_vsync = self.vsync.last_vsync_time;
        let mut cursor = now;
        let mut infos = Vec::new();

        while cursor <= limit && infos.len() < max {
            let times = self.predictor.get_prediction(&PredictionRequest {
                now: cursor,
                requested_presentation_time: HostTime::ZERO,
                last_vsync_time: last_vsync,
                vsync_interval: interval,
            });
            infos.push(FuturePresentationInfo {
                latch_point: times.latch_point_time,
                presentation_time: times.presentation_time,
            });

            cursor = times.latch_point_time.saturating_add(Duration(1));
            if interval.0 > 0 && cursor > last_vsync {
                let periods = cursor.saturating_duration_since(last_vsync).0 / interval.0;
                last_vsync = last_vsync.saturating_add(Duration(periods.saturating_mul(interval.0)));
            }
        }
        infos
    }
}
