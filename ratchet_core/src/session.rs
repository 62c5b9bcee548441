// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-client present queues.
//!
//! A [`Session`] buffers commands with [`enqueue`](Session::enqueue) and turns
//! the buffer into a [`PresentRequest`] on every present. Requests wait in a
//! FIFO until both their acquire fences are ready and their requested time is
//! due, then [`apply_scheduled_updates`](Session::apply_scheduled_updates)
//! applies them in order.
//!
//! Fence readiness arrives on the run loop as a [`FenceSignal`] packet. The
//! owner forwards it to [`on_fence_signal`](Session::on_fence_signal), which
//! yields the time to schedule the session for.
//!
//! # Flow control
//!
//! Each present consumes one credit from a budget of
//! [`SessionConfig::max_presents_in_flight`]. Credits come back when the
//! frame containing the present is reported to the client. Presenting with no
//! credit left is a protocol violation.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tracing::{debug, warn};

use crate::command::{Command, ResourceKind};
use crate::config::SessionConfig;
use crate::error::{ApplyError, PresentError};
use crate::fence::SyncFenceSet;
use crate::id::{ExportId, ImportId, PresentId, ResourceId, SessionId};
use crate::linker::{
    ExpirationCause, ExportedResource, ImportResolution, ResolutionCause, ResourceLinker,
};
use crate::platform::{Event, EventPair, PortSender};
use crate::scene::SceneGraph;
use crate::time::{Duration, HostTime};
use crate::timing::{Present2Info, PresentationInfo};

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Queued when a present request's acquire fences are all signaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FenceSignal {
    /// Session that presented.
    pub session: SessionId,
    /// Which present became ready.
    pub present: PresentId,
}

/// Queued when an import made by a session resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportSignal {
    /// Session that imported.
    pub session: SessionId,
    /// Local id of the imported resource.
    pub resource: ResourceId,
    /// Linker handle of the import. A resource id can be released and
    /// imported again, so this tells the two imports apart.
    pub import: ImportId,
    /// How the import resolved.
    pub resolution: ImportResolution,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Invoked once the frame containing a Present1 call reaches the display.
pub type Present1Callback = Box<dyn FnOnce(PresentationInfo)>;

/// How a present request reports completion.
pub enum Completion {
    /// Legacy present: a one-shot callback.
    Present1(Present1Callback),
    /// Present2: a record delivered through the session's frame-presented
    /// callback.
    Present2(Present2Info),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present1(_) => f.write_str("Present1"),
            Self::Present2(info) => f.debug_tuple("Present2").field(info).finish(),
        }
    }
}

/// One queued present.
#[derive(Debug)]
pub struct PresentRequest {
    present_id: PresentId,
    requested_time: HostTime,
    acquire: SyncFenceSet,
    release_fences: Vec<Event>,
    commands: Vec<Command>,
    completion: Completion,
}

impl PresentRequest {
    /// Session-local sequence number.
    #[must_use]
    pub fn present_id(&self) -> PresentId {
        self.present_id
    }

    /// Earliest time the request may be applied.
    #[must_use]
    pub fn requested_time(&self) -> HostTime {
        self.requested_time
    }

    /// Whether every acquire fence is signaled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.acquire.is_ready()
    }
}

/// Arguments of a Present2 call.
#[derive(Debug, Default)]
pub struct Present2Args {
    /// Earliest time the update may be shown.
    pub requested_presentation_time: HostTime,
    /// Fences that must be signaled before the update is applied.
    pub acquire_fences: Vec<Event>,
    /// Fences signaled once the update is superseded.
    pub release_fences: Vec<Event>,
    /// How far ahead the caller wants presentation predictions.
    pub requested_prediction_span: Duration,
}

/// Result of applying a session's due requests.
#[derive(Default)]
pub struct UpdateOutcome {
    /// Whether any request was applied, or the session failed.
    pub needs_render: bool,
    /// Whether every applied command succeeded. A failed session must be
    /// torn down.
    pub success: bool,
    /// Number of requests applied.
    pub applied: usize,
    /// Completion callbacks of the applied Present1 requests.
    pub present1_callbacks: Vec<Present1Callback>,
    /// Records of the applied Present2 requests, with latch times filled in.
    pub present2_infos: Vec<Present2Info>,
    /// Release fences of updates superseded by this one.
    pub release_fences: Vec<Event>,
}

impl fmt::Debug for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateOutcome")
            .field("needs_render", &self.needs_render)
            .field("success", &self.success)
            .field("applied", &self.applied)
            .field("present1_callbacks", &self.present1_callbacks.len())
            .field("present2_infos", &self.present2_infos)
            .field("release_fences", &self.release_fences.len())
            .finish()
    }
}

/// Collaborators a session needs while applying commands.
pub struct ApplyContext<'a> {
    /// Cross-session export/import tables.
    pub linker: &'a mut ResourceLinker,
    /// Destination of validated commands.
    pub scene: &'a mut dyn SceneGraph,
    /// Where import resolutions are queued.
    pub imports: &'a PortSender<ImportSignal>,
}

impl fmt::Debug for ApplyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyContext")
            .field("linker", &self.linker)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// State of an imported resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportState {
    /// Waiting for the exporter.
    Pending,
    /// Bound to an export.
    Bound(ExportedResource),
    /// Resolved without binding.
    Failed(ResolutionCause),
    /// Bound to an export of a different kind.
    KindMismatch(ResourceKind),
    /// Was bound, but the export has since expired.
    Expired(ExpirationCause),
}

#[derive(Debug)]
struct ImportRecord {
    id: ImportId,
    state: ImportState,
    _token: EventPair,
}

#[derive(Debug)]
struct ResourceRecord {
    kind: ResourceKind,
    export: Option<(ExportId, EventPair)>,
    import: Option<ImportRecord>,
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Presentation-time bookkeeping that enforces monotonic presents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentationTimeline {
    /// Latest time requested by any present.
    pub last_scheduled: HostTime,
    /// Requested time of the most recently applied present.
    pub last_applied: HostTime,
}

impl PresentationTimeline {
    fn admit(&mut self, requested: HostTime) -> Result<(), PresentError> {
        let floor = self.last_scheduled.max(self.last_applied);
        if requested < floor {
            return Err(PresentError::OutOfOrder {
                requested,
                last_scheduled: floor,
            });
        }
        self.last_scheduled = requested;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One client's queue of pending updates and its resources.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    queue: VecDeque<PresentRequest>,
    commands_pending_present: Vec<Command>,
    presents_in_flight: u32,
    next_present_id: u64,
    timeline: PresentationTimeline,
    fences_to_release_on_next_update: Vec<Event>,
    resources: BTreeMap<ResourceId, ResourceRecord>,
    fence_port: PortSender<FenceSignal>,
    valid: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .field("presents_in_flight", &self.presents_in_flight)
            .field("timeline", &self.timeline)
            .field("resources", &self.resources.len())
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session that reports fence readiness on `fence_port`.
    #[must_use]
    pub fn new(id: SessionId, config: SessionConfig, fence_port: PortSender<FenceSignal>) -> Self {
        Self {
            id,
            config,
            queue: VecDeque::new(),
            commands_pending_present: Vec::new(),
            presents_in_flight: 0,
            next_present_id: 1,
            timeline: PresentationTimeline::default(),
            fences_to_release_on_next_update: Vec::new(),
            resources: BTreeMap::new(),
            fence_port,
            valid: true,
        }
    }

    /// The session's id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the session is still accepting presents.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Buffers a command for the next present.
    pub fn enqueue(&mut self, command: Command) {
        self.commands_pending_present.push(command);
    }

    /// Number of buffered commands.
    #[must_use]
    pub fn num_commands_pending_present(&self) -> usize {
        self.commands_pending_present.len()
    }

    /// Presents the buffered commands with a Present1 completion callback.
    pub fn present(
        &mut self,
        requested_time: HostTime,
        acquire_fences: Vec<Event>,
        release_fences: Vec<Event>,
        callback: Present1Callback,
    ) -> Result<PresentId, PresentError> {
        self.schedule_present(
            requested_time,
            acquire_fences,
            release_fences,
            Completion::Present1(callback),
        )
    }

    /// Presents the buffered commands, recording a [`Present2Info`] received
    /// at `now`.
    pub fn present2(&mut self, args: Present2Args, now: HostTime) -> Result<PresentId, PresentError> {
        let info = Present2Info {
            session: self.id,
            present_received_time: now,
            latched_time: None,
        };
        self.schedule_present(
            args.requested_presentation_time,
            args.acquire_fences,
            args.release_fences,
            Completion::Present2(info),
        )
    }

    fn schedule_present(
        &mut self,
        requested_time: HostTime,
        acquire_fences: Vec<Event>,
        release_fences: Vec<Event>,
        completion: Completion,
    ) -> Result<PresentId, PresentError> {
        if !self.valid {
            return Err(PresentError::UnknownSession(self.id));
        }
        if self.presents_in_flight >= self.config.max_presents_in_flight {
            return Err(PresentError::BudgetExhausted {
                in_flight: self.presents_in_flight,
            });
        }
        self.timeline.admit(requested_time)?;

        let present_id = PresentId(self.next_present_id);
        self.next_present_id += 1;
        self.presents_in_flight += 1;

        let mut acquire = SyncFenceSet::new(acquire_fences);
        acquire.wait_ready_async(
            &self.fence_port,
            FenceSignal {
                session: self.id,
                present: present_id,
            },
        );
        self.queue.push_back(PresentRequest {
            present_id,
            requested_time,
            acquire,
            release_fences,
            commands: core::mem::take(&mut self.commands_pending_present),
            completion,
        });
        debug!(session = %self.id, ?present_id, ?requested_time, "present queued");
        Ok(present_id)
    }

    /// Handles a [`FenceSignal`] for this session.
    ///
    /// Returns the time to schedule an update for, the first time the
    /// request is seen ready. Unknown or already-handled presents yield
    /// `None`.
    pub fn on_fence_signal(&mut self, present: PresentId) -> Option<HostTime> {
        let request = self
            .queue
            .iter_mut()
            .find(|request| request.present_id == present)?;
        request
            .acquire
            .observe_ready()
            .then_some(request.requested_time)
    }

    /// Applies every due request whose fences are ready, in order.
    ///
    /// Stops at the first request that is not yet due or not yet ready. If a
    /// command fails, the rest of the queue is discarded, the release fences
    /// of every discarded request are returned, and the outcome reports
    /// `success = false`.
    pub fn apply_scheduled_updates(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        target_presentation_time: HostTime,
        latched_time: HostTime,
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome {
            success: true,
            ..UpdateOutcome::default()
        };

        while let Some(front) = self.queue.front() {
            if front.requested_time > target_presentation_time || !front.is_ready() {
                break;
            }
            let Some(request) = self.queue.pop_front() else {
                break;
            };

            for command in request.commands {
                if let Err(error) = self.apply_command(ctx, command) {
                    warn!(session = %self.id, present_id = ?request.present_id, %error, "failed to apply update");
                    outcome.release_fences.extend(request.release_fences);
                    for discarded in self.queue.drain(..) {
                        outcome.release_fences.extend(discarded.release_fences);
                    }
                    outcome.success = false;
                    outcome.needs_render = true;
                    return outcome;
                }
            }

            outcome.release_fences.extend(core::mem::replace(
                &mut self.fences_to_release_on_next_update,
                request.release_fences,
            ));
            self.timeline.last_applied = request.requested_time;
            match request.completion {
                Completion::Present1(callback) => outcome.present1_callbacks.push(callback),
                Completion::Present2(mut info) => {
                    info.latched_time = Some(latched_time);
                    outcome.present2_infos.push(info);
                }
            }
            outcome.applied += 1;
            outcome.needs_render = true;
        }
        outcome
    }

    fn apply_command(
        &mut self,
        ctx: &mut ApplyContext<'_>,
        command: Command,
    ) -> Result<(), ApplyError> {
        match command {
            Command::Create { id, kind } => {
                if self.resources.contains_key(&id) {
                    return Err(ApplyError::DuplicateResource(id));
                }
                ctx.scene.apply_command(self.id, &command)?;
                self.resources.insert(
                    id,
                    ResourceRecord {
                        kind,
                        export: None,
                        import: None,
                    },
                );
            }
            Command::Release { id } => {
                let record = self
                    .resources
                    .remove(&id)
                    .ok_or(ApplyError::UnknownResource(id))?;
                ctx.scene.apply_command(self.id, &command)?;
                Self::release_links(ctx.linker, record);
            }
            Command::AddChild { parent, child } => {
                let parent_kind = self.kind_of(parent)?;
                self.kind_of(child)?;
                if parent_kind != ResourceKind::Node {
                    return Err(ApplyError::NotANode(parent));
                }
                ctx.scene.apply_command(self.id, &command)?;
            }
            Command::Detach { id } | Command::SetTag { id, .. } => {
                self.kind_of(id)?;
                ctx.scene.apply_command(self.id, &command)?;
            }
            Command::Export { id, ref token } => {
                let kind = self.kind_of(id)?;
                if self.resources.get(&id).is_some_and(|r| r.export.is_some()) {
                    return Err(ApplyError::AlreadyExported(id));
                }
                // The scene may still reject the command; only a validated
                // export may become visible to importers.
                ctx.scene.apply_command(self.id, &command)?;
                let export = ctx.linker.export_resource(
                    ExportedResource {
                        owner: self.id,
                        resource: id,
                        kind,
                    },
                    token,
                )?;
                if let Some(record) = self.resources.get_mut(&id) {
                    record.export = Some((export, token.duplicate()));
                }
            }
            Command::Import { id, kind, ref token } => {
                if self.resources.contains_key(&id) {
                    return Err(ApplyError::DuplicateResource(id));
                }
                ctx.scene.apply_command(self.id, &command)?;

                let port = ctx.imports.clone();
                let session = self.id;
                let callback = Box::new(move |import: ImportId, resolution: ImportResolution| {
                    port.queue(ImportSignal {
                        session,
                        resource: id,
                        import,
                        resolution,
                    });
                });
                let (import, state) = match ctx.linker.import_resource(kind, token, callback) {
                    Ok(import) => (import, ImportState::Pending),
                    Err(error) => {
                        debug!(session = %self.id, resource = %id, %error, "import failed at registration");
                        // The linker never hands out id 0, so late signals
                        // for this import are ignored.
                        (
                            ImportId(0),
                            ImportState::Failed(ResolutionCause::ExportHandleDiedBeforeBind),
                        )
                    }
                };
                self.resources.insert(
                    id,
                    ResourceRecord {
                        kind,
                        export: None,
                        import: Some(ImportRecord {
                            id: import,
                            state,
                            _token: token.duplicate(),
                        }),
                    },
                );
            }
        }
        Ok(())
    }

    fn kind_of(&self, id: ResourceId) -> Result<ResourceKind, ApplyError> {
        self.resources
            .get(&id)
            .map(|record| record.kind)
            .ok_or(ApplyError::UnknownResource(id))
    }

    fn release_links(linker: &mut ResourceLinker, record: ResourceRecord) {
        if let Some((export, _token)) = record.export {
            // Already gone if the export expired on its own.
            let _ = linker.on_resource_destroyed(export);
        }
        if let Some(import) = record.import
            && import.state == ImportState::Pending
        {
            let _ = linker.destroy_import(import.id);
        }
    }

    /// Records the resolution of an import this session made.
    ///
    /// Resolutions for an import that no longer backs `resource` are
    /// ignored.
    pub fn on_import_resolved(
        &mut self,
        resource: ResourceId,
        import_id: ImportId,
        resolution: ImportResolution,
    ) {
        let Some(record) = self.resources.get_mut(&resource) else {
            return;
        };
        let expected = record.kind;
        let Some(import) = record.import.as_mut() else {
            return;
        };
        if import.id != import_id {
            debug!(session = %self.id, %resource, stale = ?import_id, current = ?import.id, "stale import resolution");
            return;
        }
        if import.state != ImportState::Pending {
            return;
        }
        import.state = match resolution {
            ImportResolution::Success(exported) if exported.kind == expected => {
                ImportState::Bound(exported)
            }
            ImportResolution::Success(exported) => {
                warn!(session = %self.id, %resource, ?expected, actual = ?exported.kind, "imported resource has the wrong kind");
                ImportState::KindMismatch(exported.kind)
            }
            other => ImportState::Failed(other.cause()),
        };
    }

    /// Forgets an export of this session that the linker expired.
    pub fn on_export_expired(&mut self, export: ExportId) {
        for record in self.resources.values_mut() {
            if record.export.as_ref().is_some_and(|(id, _)| *id == export) {
                record.export = None;
            }
        }
    }

    /// Marks imports bound to `exported` as expired.
    pub fn on_import_source_expired(&mut self, exported: &ExportedResource, cause: ExpirationCause) {
        for import in self.resources.values_mut().filter_map(|r| r.import.as_mut()) {
            if import.state == ImportState::Bound(*exported) {
                import.state = ImportState::Expired(cause);
            }
        }
    }

    /// Returns credit for `count` presents that reached the client, and the
    /// resulting number of presents allowed.
    pub fn on_presents_completed(&mut self, count: u32) -> u32 {
        self.presents_in_flight = self.presents_in_flight.saturating_sub(count);
        self.num_presents_allowed()
    }

    /// Presents the session may still issue.
    #[must_use]
    pub fn num_presents_allowed(&self) -> u32 {
        self.config
            .max_presents_in_flight
            .saturating_sub(self.presents_in_flight)
    }

    /// Number of queued requests.
    #[must_use]
    pub fn num_queued_requests(&self) -> usize {
        self.queue.len()
    }

    /// Whether any request is still queued.
    #[must_use]
    pub fn has_pending_updates(&self) -> bool {
        !self.queue.is_empty()
    }

    /// The session's presentation timeline.
    #[must_use]
    pub fn timeline(&self) -> PresentationTimeline {
        self.timeline
    }

    /// Number of live resources.
    #[must_use]
    pub fn num_resources(&self) -> usize {
        self.resources.len()
    }

    /// Kind of resource `id`, if it exists.
    #[must_use]
    pub fn resource_kind(&self, id: ResourceId) -> Option<ResourceKind> {
        self.resources.get(&id).map(|r| r.kind)
    }

    /// Whether resource `id` is currently exported.
    #[must_use]
    pub fn is_exported(&self, id: ResourceId) -> bool {
        self.resources.get(&id).is_some_and(|r| r.export.is_some())
    }

    /// Import state of resource `id`, if it was imported.
    #[must_use]
    pub fn import_state(&self, id: ResourceId) -> Option<ImportState> {
        self.resources.get(&id)?.import.as_ref().map(|i| i.state)
    }

    /// Discards all queued work and releases every resource.
    ///
    /// Returns the release fences still held, which the caller should
    /// signal since their content will never be shown again.
    pub fn tear_down(&mut self, ctx: &mut ApplyContext<'_>) -> Vec<Event> {
        self.valid = false;
        self.queue.clear();
        self.commands_pending_present.clear();
        for (_, record) in core::mem::take(&mut self.resources) {
            Self::release_links(ctx.linker, record);
        }
        ctx.scene.remove_session(self.id);
        debug_assert_eq!(
            ctx.linker.num_exports_for_session(self.id),
            0,
            "torn-down session still has exports"
        );
        core::mem::take(&mut self.fences_to_release_on_next_update)
    }
}
