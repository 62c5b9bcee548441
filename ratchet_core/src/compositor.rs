// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The run loop façade.
//!
//! A [`Compositor`] owns the clock, the [`FrameScheduler`], and the
//! [`Engine`], and is the single place where they meet. Transports call the
//! session-facing methods; the embedder calls [`poll`](Compositor::poll)
//! whenever a signal may have arrived or [`next_wakeup`](Compositor::next_wakeup)
//! has passed, and reports render and display completion.
//!
//! Protocol violations by a session (out-of-order presents, exhausted
//! budget) destroy that session.

use tracing::warn;

use crate::backend::Renderer;
use crate::clock::{Clock, ManualClock};
use crate::command::Command;
use crate::config::RatchetConfig;
use crate::engine::Engine;
use crate::error::{ConfigError, PresentError};
use crate::id::{PresentId, SessionId};
use crate::platform::Event;
use crate::scene::{NodeTree, SceneGraph};
use crate::scheduler::{FramePresentedCallback, FrameScheduler};
use crate::session::{Present1Callback, Present2Args};
use crate::time::{Duration, HostTime};
use crate::timing::FuturePresentationInfo;
use crate::trace::{TraceSink, Tracer};

fn tracer(sink: &mut Option<Box<dyn TraceSink>>) -> Tracer<'_> {
    match sink.as_deref_mut() {
        Some(sink) => Tracer::new(sink),
        None => Tracer::none(),
    }
}

/// Present queues, linker, and frame scheduling behind one run loop.
pub struct Compositor<C: Clock> {
    clock: C,
    scheduler: FrameScheduler,
    engine: Engine,
    trace_sink: Option<Box<dyn TraceSink>>,
}

impl<C: Clock> core::fmt::Debug for Compositor<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compositor")
            .field("now", &self.clock.now())
            .field("scheduler", &self.scheduler)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Compositor<C> {
    /// Creates a compositor rendering a [`NodeTree`] with `renderer`.
    pub fn new(config: RatchetConfig, clock: C, renderer: Box<dyn Renderer>) -> Result<Self, ConfigError> {
        Self::with_scene(config, clock, Box::new(NodeTree::new()), renderer)
    }

    /// Creates a compositor with a custom scene graph.
    pub fn with_scene(
        config: RatchetConfig,
        clock: C,
        scene: Box<dyn SceneGraph>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = FrameScheduler::new(config.scheduler, clock.now());
        let engine = Engine::with_scene(config.engine, config.session, scene, renderer);
        Ok(Self {
            clock,
            scheduler,
            engine,
            trace_sink: None,
        })
    }

    /// Routes frame-loop trace events to `sink`.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace_sink = Some(sink);
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.trace_sink.take()
    }

    /// The clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable access to the engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Connects a new client.
    pub fn create_session(&mut self) -> SessionId {
        self.engine.create_session()
    }

    /// Disconnects a client, discarding its queue and severing its exports.
    pub fn destroy_session(&mut self, session: SessionId) -> bool {
        self.scheduler.remove_session(session);
        self.engine.destroy_session(session)
    }

    /// Buffers `command` for the next present of `session`.
    pub fn enqueue(&mut self, session: SessionId, command: Command) -> Result<(), PresentError> {
        self.engine
            .session_mut(session)
            .ok_or(PresentError::UnknownSession(session))?
            .enqueue(command);
        Ok(())
    }

    /// Presents the buffered commands of `session` with a Present1 callback.
    ///
    /// An error is fatal to the session, which is destroyed before this
    /// returns.
    pub fn present(
        &mut self,
        session: SessionId,
        requested_time: HostTime,
        acquire_fences: Vec<Event>,
        release_fences: Vec<Event>,
        callback: Present1Callback,
    ) -> Result<PresentId, PresentError> {
        let result = self
            .engine
            .session_mut(session)
            .ok_or(PresentError::UnknownSession(session))?
            .present(requested_time, acquire_fences, release_fences, callback);
        self.kill_on_violation(session, result)
    }

    /// Presents the buffered commands of `session` and returns predicted
    /// future presentations within the requested span.
    ///
    /// Completion is reported through the callback installed with
    /// [`set_on_frame_presented_callback`](Self::set_on_frame_presented_callback).
    /// An error is fatal to the session.
    pub fn present2(
        &mut self,
        session: SessionId,
        args: Present2Args,
    ) -> Result<Vec<FuturePresentationInfo>, PresentError> {
        let now = self.clock.now();
        let span = args.requested_prediction_span;
        let result = self
            .engine
            .session_mut(session)
            .ok_or(PresentError::UnknownSession(session))?
            .present2(args, now);
        self.kill_on_violation(session, result)?;
        Ok(self.scheduler.get_future_presentation_infos(now, span))
    }

    fn kill_on_violation<T>(
        &mut self,
        session: SessionId,
        result: Result<T, PresentError>,
    ) -> Result<T, PresentError> {
        if let Err(error) = &result {
            warn!(%session, %error, "protocol violation, closing session");
            self.destroy_session(session);
        }
        result
    }

    /// Installs the Present2 notification callback of `session`.
    pub fn set_on_frame_presented_callback(
        &mut self,
        session: SessionId,
        callback: FramePresentedCallback,
    ) {
        self.scheduler
            .set_on_frame_presented_callback(session, callback);
    }

    /// Predicted presentations within `span` from now.
    #[must_use]
    pub fn request_future_presentation_times(&self, span: Duration) -> Vec<FuturePresentationInfo> {
        self.scheduler
            .get_future_presentation_infos(self.clock.now(), span)
    }

    /// Renders every vsync while enabled.
    pub fn set_render_continuously(&mut self, enabled: bool) {
        let now = self.clock.now();
        self.scheduler
            .set_render_continuously(now, enabled, &mut tracer(&mut self.trace_sink));
    }

    /// When [`poll`](Self::poll) next needs to run, absent new signals.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<HostTime> {
        self.scheduler.next_wakeup()
    }

    /// Processes queued signals, then runs the scheduler's wakeup if it is
    /// due. Returns whether a wakeup ran.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        let mut trace = tracer(&mut self.trace_sink);
        for (session, time) in self.engine.dispatch_signals() {
            self.scheduler
                .schedule_update_for_session(now, time, session, &mut trace);
        }
        match self.scheduler.next_wakeup() {
            Some(wakeup) if wakeup <= now => {
                self.scheduler
                    .on_wakeup(&self.clock, &mut self.engine, &mut trace);
                true
            }
            _ => false,
        }
    }

    /// Reports that the renderer finished frame `frame_number`.
    pub fn on_frame_rendered(&mut self, frame_number: u64, render_done_time: HostTime) {
        self.scheduler.on_frame_rendered(
            frame_number,
            render_done_time,
            &mut tracer(&mut self.trace_sink),
        );
    }

    /// Reports that frame `frame_number` reached the display. Returns `false`
    /// if it is not the oldest frame in flight.
    pub fn on_frame_presented(&mut self, frame_number: u64, actual_presentation_time: HostTime) -> bool {
        self.retire(frame_number, Some(actual_presentation_time))
    }

    /// Reports that frame `frame_number` never reached the display.
    pub fn on_frame_dropped(&mut self, frame_number: u64) -> bool {
        self.retire(frame_number, None)
    }

    fn retire(&mut self, frame_number: u64, actual: Option<HostTime>) -> bool {
        let now = self.clock.now();
        self.scheduler.on_frame_presented(
            now,
            frame_number,
            actual,
            &mut self.engine,
            &mut tracer(&mut self.trace_sink),
        )
    }

    /// Text dump of the current scene.
    #[must_use]
    pub fn dump_scene(&self) -> String {
        self.engine.scene().dump()
    }

    /// Number of live exports.
    #[must_use]
    pub fn num_exports(&self) -> usize {
        self.engine.linker().num_exports()
    }

    /// Number of imports still waiting for an export.
    #[must_use]
    pub fn num_unresolved_imports(&self) -> usize {
        self.engine.linker().num_unresolved_imports()
    }
}

impl Compositor<ManualClock> {
    /// Advances virtual time to `deadline`, running every wakeup on the way.
    /// Returns the number of wakeups run.
    pub fn run_until(&mut self, deadline: HostTime) -> usize {
        let mut wakeups = 0;
        loop {
            if self.poll() {
                wakeups += 1;
                continue;
            }
            match self.scheduler.next_wakeup() {
                Some(wakeup) if wakeup <= deadline => self.clock.set(wakeup),
                _ => break,
            }
        }
        self.clock.set(deadline);
        wakeups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullRenderer;
    use crate::command::ResourceKind;
    use crate::config::SchedulerConfig;
    use crate::id::ResourceId;

    const MS: u64 = 1_000_000;

    fn compositor() -> Compositor<ManualClock> {
        let config = RatchetConfig {
            scheduler: SchedulerConfig {
                vsync_interval: Duration(16 * MS),
                safety_multiplier: 1.0,
                ..SchedulerConfig::hz60()
            },
            ..RatchetConfig::default()
        };
        Compositor::new(config, ManualClock::new(HostTime::ZERO), Box::new(NullRenderer)).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = RatchetConfig::default();
        config.session.max_presents_in_flight = 0;
        assert!(
            Compositor::new(config, ManualClock::default(), Box::new(NullRenderer)).is_err()
        );
    }

    #[test]
    fn out_of_order_present_kills_session() {
        let mut c = compositor();
        let s = c.create_session();
        c.present(s, HostTime(20 * MS), vec![], vec![], Box::new(|_| {}))
            .unwrap();
        let err = c
            .present(s, HostTime(10 * MS), vec![], vec![], Box::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, PresentError::OutOfOrder { .. }));
        assert!(c.engine().session(s).is_none(), "violations are fatal");
        assert_eq!(
            c.enqueue(s, Command::Detach { id: ResourceId(1) }),
            Err(PresentError::UnknownSession(s))
        );
    }

    #[test]
    fn present_poll_render_cycle() {
        let mut c = compositor();
        let s = c.create_session();
        c.enqueue(
            s,
            Command::Create {
                id: ResourceId(1),
                kind: ResourceKind::Node,
            },
        )
        .unwrap();
        c.present(s, HostTime::ZERO, vec![], vec![], Box::new(|_| {}))
            .unwrap();
        assert!(!c.poll(), "wakeup is scheduled for later");
        assert!(c.next_wakeup().is_some());

        assert_eq!(c.run_until(HostTime(20 * MS)), 1);
        assert_eq!(c.scheduler().num_outstanding_frames(), 1);
        assert_eq!(c.dump_scene(), "session 1\n  node 1\n");
        assert!(c.on_frame_presented(0, HostTime(16 * MS)));
        assert_eq!(c.engine().session(s).unwrap().num_presents_allowed(), 5);
    }

    #[test]
    fn present2_returns_predictions() {
        let mut c = compositor();
        let s = c.create_session();
        let infos = c
            .present2(
                s,
                Present2Args {
                    requested_prediction_span: Duration(40 * MS),
                    ..Present2Args::default()
                },
            )
            .unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(c.request_future_presentation_times(Duration::ZERO).len(), 1);
    }
}
