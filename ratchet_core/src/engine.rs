// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The engine: sessions, the linker, the scene, and the renderer.
//!
//! [`Engine`] is what the [`FrameScheduler`](crate::scheduler::FrameScheduler)
//! drives at each wakeup. It implements [`SessionUpdater`] by applying the
//! due updates of each session, in ascending session order, and
//! [`FrameRenderer`] by handing the scene to its [`Renderer`].
//!
//! Signals raised off the run loop (fence readiness, token closure, import
//! resolution) queue up on the engine's ports until
//! [`dispatch_signals`](Engine::dispatch_signals) routes them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, info, trace, warn};

use crate::backend::Renderer;
use crate::config::{EngineConfig, SessionConfig};
use crate::id::{SessionId, SessionIdAllocator};
use crate::linker::ResourceLinker;
use crate::platform::{Event, Port, PortSender};
use crate::scene::{NodeTree, SceneGraph};
use crate::scheduler::{FrameRenderer, RenderOutcome, SessionUpdater, UpdateResults};
use crate::session::{ApplyContext, FenceSignal, ImportSignal, Session};
use crate::time::HostTime;
use crate::timing::FrameTimings;

/// Owns every session and applies their updates.
pub struct Engine {
    config: EngineConfig,
    session_config: SessionConfig,
    ids: SessionIdAllocator,
    sessions: BTreeMap<SessionId, Session>,
    linker: ResourceLinker,
    scene: Box<dyn SceneGraph>,
    renderer: Box<dyn Renderer>,
    fences: Port<FenceSignal>,
    imports: Port<ImportSignal>,
    import_sender: PortSender<ImportSignal>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("session_config", &self.session_config)
            .field("sessions", &self.sessions)
            .field("linker", &self.linker)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine rendering a [`NodeTree`] scene.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        session_config: SessionConfig,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self::with_scene(config, session_config, Box::new(NodeTree::new()), renderer)
    }

    /// Creates an engine with a custom scene graph.
    #[must_use]
    pub fn with_scene(
        config: EngineConfig,
        session_config: SessionConfig,
        scene: Box<dyn SceneGraph>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        let imports = Port::new();
        Self {
            config,
            session_config,
            ids: SessionIdAllocator::new(),
            sessions: BTreeMap::new(),
            linker: ResourceLinker::new(),
            scene,
            renderer,
            fences: Port::new(),
            import_sender: imports.sender(),
            imports,
        }
    }

    /// Creates a session with a fresh id.
    pub fn create_session(&mut self) -> SessionId {
        let id = self.ids.allocate();
        self.sessions.insert(
            id,
            Session::new(id, self.session_config, self.fences.sender()),
        );
        info!(session = %id, "session created");
        id
    }

    /// Tears down and removes `session`. Returns `false` if it did not exist.
    pub fn destroy_session(&mut self, session: SessionId) -> bool {
        let Some(mut removed) = self.sessions.remove(&session) else {
            return false;
        };
        let mut ctx = ApplyContext {
            linker: &mut self.linker,
            scene: &mut *self.scene,
            imports: &self.import_sender,
        };
        for fence in removed.tear_down(&mut ctx) {
            fence.signal();
        }
        info!(%session, "session destroyed");
        true
    }

    /// The session with id `session`.
    #[must_use]
    pub fn session(&self, session: SessionId) -> Option<&Session> {
        self.sessions.get(&session)
    }

    /// Mutable access to the session with id `session`.
    pub fn session_mut(&mut self, session: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&session)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn num_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// The resource linker.
    #[must_use]
    pub fn linker(&self) -> &ResourceLinker {
        &self.linker
    }

    /// Mutable access to the resource linker, to install observers.
    pub fn linker_mut(&mut self) -> &mut ResourceLinker {
        &mut self.linker
    }

    /// The scene graph.
    #[must_use]
    pub fn scene(&self) -> &dyn SceneGraph {
        &*self.scene
    }

    /// Routes every queued signal to its session or to the linker.
    ///
    /// Returns the `(session, time)` pairs that became ready and must be
    /// scheduled.
    pub fn dispatch_signals(&mut self) -> Vec<(SessionId, HostTime)> {
        let mut ready = Vec::new();
        for signal in self.fences.drain() {
            if let Some(session) = self.sessions.get_mut(&signal.session)
                && let Some(time) = session.on_fence_signal(signal.present)
            {
                ready.push((signal.session, time));
            }
        }

        self.linker.process_signals();

        for signal in self.imports.drain() {
            if let Some(session) = self.sessions.get_mut(&signal.session) {
                session.on_import_resolved(signal.resource, signal.import, signal.resolution);
            }
        }

        for expiration in self.linker.take_expirations() {
            debug!(export = ?expiration.export, cause = ?expiration.cause, "export expired");
            if let Some(owner) = self.sessions.get_mut(&expiration.resource.owner) {
                owner.on_export_expired(expiration.export);
            }
            for session in self.sessions.values_mut() {
                session.on_import_source_expired(&expiration.resource, expiration.cause);
            }
        }
        ready
    }

    fn signal_all(fences: Vec<Event>) {
        for fence in fences {
            fence.signal();
        }
    }
}

impl SessionUpdater for Engine {
    fn update_sessions(
        &mut self,
        sessions: &BTreeSet<SessionId>,
        target_presentation_time: HostTime,
        latched_time: HostTime,
        frame_number: u64,
    ) -> UpdateResults {
        let verbose = frame_number < self.config.verbose_frame_count;
        let mut results = UpdateResults::default();

        for &id in sessions {
            let Some(session) = self.sessions.get_mut(&id) else {
                debug!(session = %id, "due session no longer exists");
                results.needs_render |= self.config.render_on_missing_session;
                continue;
            };
            let mut ctx = ApplyContext {
                linker: &mut self.linker,
                scene: &mut *self.scene,
                imports: &self.import_sender,
            };
            let outcome =
                session.apply_scheduled_updates(&mut ctx, target_presentation_time, latched_time);

            if !outcome.success {
                warn!(session = %id, frame_number, "update failed, tearing session down");
                Self::signal_all(outcome.release_fences);
                Self::signal_all(session.tear_down(&mut ctx));
                self.sessions.remove(&id);
                results.sessions_torn_down.push(id);
                results.needs_render = true;
                continue;
            }

            if verbose {
                debug!(session = %id, frame_number, applied = outcome.applied, "session updated");
            } else {
                trace!(session = %id, frame_number, applied = outcome.applied, "session updated");
            }
            results.needs_render |= outcome.needs_render;
            results
                .present1_callbacks
                .extend(outcome.present1_callbacks.into_iter().map(|cb| (id, cb)));
            results.present2_infos.extend(outcome.present2_infos);
            results.release_fences.extend(outcome.release_fences);
        }
        results
    }

    fn prepare_frame(&mut self, presentation_time: HostTime, frame_number: u64) {
        if frame_number < self.config.verbose_frame_count {
            debug!(frame_number, ?presentation_time, "preparing frame");
        }
    }

    fn on_presents_completed(&mut self, session: SessionId, count: u32) -> Option<u32> {
        self.sessions
            .get_mut(&session)
            .map(|s| s.on_presents_completed(count))
    }
}

impl FrameRenderer for Engine {
    fn render_frame(&mut self, timings: &FrameTimings, presentation_time: HostTime) -> RenderOutcome {
        if !self.scene.has_content() {
            return RenderOutcome::NoContent;
        }
        match self.renderer.render(&*self.scene, timings) {
            Ok(()) => {
                if timings.frame_number < self.config.verbose_frame_count {
                    debug!(frame_number = timings.frame_number, ?presentation_time, "frame submitted");
                }
                RenderOutcome::Rendered
            }
            Err(error) => {
                warn!(frame_number = timings.frame_number, %error, "renderer failed");
                RenderOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::NullRenderer;
    use crate::command::{Command, ResourceKind};
    use crate::error::RenderError;
    use crate::id::ResourceId;
    use crate::platform::EventPair;

    fn engine() -> Engine {
        Engine::new(
            EngineConfig::new(),
            SessionConfig::new(),
            Box::new(NullRenderer),
        )
    }

    fn due(ids: &[SessionId]) -> BTreeSet<SessionId> {
        ids.iter().copied().collect()
    }

    fn present_now(engine: &mut Engine, session: SessionId, commands: Vec<Command>) {
        let s = engine.session_mut(session).unwrap();
        for command in commands {
            s.enqueue(command);
        }
        s.present(HostTime::ZERO, vec![], vec![], Box::new(|_| {}))
            .unwrap();
    }

    fn node(id: u64) -> Command {
        Command::Create {
            id: ResourceId(id),
            kind: ResourceKind::Node,
        }
    }

    #[test]
    fn session_ids_are_unique() {
        let mut e = engine();
        let a = e.create_session();
        let b = e.create_session();
        assert_ne!(a, b);
        assert!(e.destroy_session(a));
        assert!(!e.destroy_session(a), "already gone");
        assert_ne!(e.create_session(), a, "ids are never reused");
    }

    #[test]
    fn ready_presents_are_dispatched() {
        let mut e = engine();
        let s = e.create_session();
        let fence = Event::new();
        e.session_mut(s)
            .unwrap()
            .present(HostTime(40), vec![fence.clone()], vec![], Box::new(|_| {}))
            .unwrap();
        assert!(e.dispatch_signals().is_empty());
        fence.signal();
        assert_eq!(e.dispatch_signals(), vec![(s, HostTime(40))]);
        assert!(e.dispatch_signals().is_empty(), "dispatched once");
    }

    #[test]
    fn missing_session_forces_render_by_default() {
        let mut e = engine();
        let results = e.update_sessions(&due(&[SessionId(77)]), HostTime(16), HostTime(11), 0);
        assert!(results.needs_render);

        let mut quiet = Engine::new(
            EngineConfig {
                render_on_missing_session: false,
                ..EngineConfig::new()
            },
            SessionConfig::new(),
            Box::new(NullRenderer),
        );
        let results = quiet.update_sessions(&due(&[SessionId(77)]), HostTime(16), HostTime(11), 0);
        assert!(!results.needs_render);
    }

    #[test]
    fn failing_session_is_torn_down_and_others_apply() {
        let mut e = engine();
        let good = e.create_session();
        let bad = e.create_session();
        present_now(&mut e, good, vec![node(1)]);
        present_now(&mut e, bad, vec![Command::Detach { id: ResourceId(5) }]);

        let results = e.update_sessions(&due(&[good, bad]), HostTime(16), HostTime(11), 0);
        assert!(results.needs_render);
        assert_eq!(results.sessions_torn_down, vec![bad]);
        assert_eq!(results.present1_callbacks.len(), 1);
        assert_eq!(results.present1_callbacks[0].0, good);
        assert!(e.session(bad).is_none());
        assert_eq!(e.session(good).unwrap().num_resources(), 1);
    }

    #[test]
    fn credits_refill_per_session() {
        let mut e = engine();
        let s = e.create_session();
        present_now(&mut e, s, vec![]);
        present_now(&mut e, s, vec![]);
        assert_eq!(e.session(s).unwrap().num_presents_allowed(), 3);
        assert_eq!(e.on_presents_completed(s, 2), Some(5));
        assert_eq!(e.on_presents_completed(SessionId(99), 1), None);
    }

    #[test]
    fn empty_scene_has_no_content() {
        let mut e = engine();
        let timings = FrameTimings {
            frame_number: 0,
            target_presentation_time: HostTime(16),
            latch_time: HostTime(11),
            update_done_time: HostTime(12),
            render_start_time: HostTime(12),
            render_done_time: None,
            actual_presentation_time: None,
            dropped: false,
        };
        assert_eq!(e.render_frame(&timings, HostTime(16)), RenderOutcome::NoContent);

        let s = e.create_session();
        present_now(&mut e, s, vec![node(1)]);
        e.update_sessions(&due(&[s]), HostTime(16), HostTime(11), 0);
        assert_eq!(e.render_frame(&timings, HostTime(16)), RenderOutcome::Rendered);
    }

    #[test]
    fn renderer_errors_become_failed_frames() {
        struct Broken(Rc<RefCell<u32>>);
        impl Renderer for Broken {
            fn render(
                &mut self,
                _scene: &dyn SceneGraph,
                _timings: &FrameTimings,
            ) -> Result<(), RenderError> {
                *self.0.borrow_mut() += 1;
                Err(RenderError::Backend("device lost".into()))
            }
        }

        let calls = Rc::new(RefCell::new(0));
        let mut e = Engine::new(
            EngineConfig::new(),
            SessionConfig::new(),
            Box::new(Broken(Rc::clone(&calls))),
        );
        let s = e.create_session();
        present_now(&mut e, s, vec![node(1)]);
        e.update_sessions(&due(&[s]), HostTime(16), HostTime(11), 0);
        let timings = FrameTimings {
            frame_number: 0,
            target_presentation_time: HostTime(16),
            latch_time: HostTime(11),
            update_done_time: HostTime(12),
            render_start_time: HostTime(12),
            render_done_time: None,
            actual_presentation_time: None,
            dropped: false,
        };
        assert_eq!(e.render_frame(&timings, HostTime(16)), RenderOutcome::Failed);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn expirations_reach_importers() {
        let mut e = engine();
        let exporter = e.create_session();
        let importer = e.create_session();
        let (a, b) = EventPair::create();
        present_now(
            &mut e,
            exporter,
            vec![
                node(1),
                Command::Export {
                    id: ResourceId(1),
                    token: a,
                },
            ],
        );
        present_now(
            &mut e,
            importer,
            vec![Command::Import {
                id: ResourceId(3),
                kind: ResourceKind::Node,
                token: b,
            }],
        );
        e.update_sessions(&due(&[exporter, importer]), HostTime(16), HostTime(11), 0);
        e.dispatch_signals();
        assert!(matches!(
            e.session(importer).unwrap().import_state(ResourceId(3)),
            Some(crate::session::ImportState::Bound(_))
        ));

        assert!(e.destroy_session(exporter));
        assert_eq!(e.linker().num_exports(), 0);
        e.dispatch_signals();
        assert!(matches!(
            e.session(importer).unwrap().import_state(ResourceId(3)),
            Some(crate::session::ImportState::Expired(_))
        ));
    }

    #[test]
    fn session_keeps_its_export_alive_after_client_closes_token() {
        let mut e = engine();
        let expired = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&expired);
        e.linker_mut()
            .set_on_expired_callback(Box::new(move |_, cause| seen.borrow_mut().push(cause)));
        let s = e.create_session();
        let (a, _b) = EventPair::create();
        let client_copy = a.duplicate();
        present_now(
            &mut e,
            s,
            vec![
                node(1),
                Command::Export {
                    id: ResourceId(1),
                    token: a,
                },
            ],
        );
        e.update_sessions(&due(&[s]), HostTime(16), HostTime(11), 0);

        drop(client_copy);
        e.dispatch_signals();
        assert_eq!(e.linker().num_exports(), 1, "the session still holds the endpoint");

        e.session_mut(s)
            .unwrap()
            .enqueue(Command::Release { id: ResourceId(1) });
        e.session_mut(s)
            .unwrap()
            .present(HostTime(16), vec![], vec![], Box::new(|_| {}))
            .unwrap();
        e.update_sessions(&due(&[s]), HostTime(32), HostTime(27), 1);
        e.dispatch_signals();
        assert_eq!(e.linker().num_exports(), 0);
        assert_eq!(
            *expired.borrow(),
            vec![crate::linker::ExpirationCause::ResourceDestroyed]
        );
    }
}
