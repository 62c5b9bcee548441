// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-session resource export and import.
//!
//! Sessions share resources through a linked [`EventPair`]. The exporter
//! hands one endpoint to [`ResourceLinker::export_resource`]; the importer
//! hands the other endpoint to [`ResourceLinker::import_resource`]. Both
//! sides key their records by the same koid, the importer's endpoint, so
//! whichever side arrives first waits for the other:
//!
//! ```text
//!   exporter token A ──related_koid──┐
//!                                    ├── key = koid(B)
//!   importer token B ─────koid───────┘
//! ```
//!
//! Any number of imports may resolve against one export. Token closure is
//! observed asynchronously through the linker's own [`Port`]; the owner
//! calls [`ResourceLinker::process_signals`] from the run loop to act on it.
//!
//! Callbacks run after the linker's tables are updated, never while an entry
//! is half-removed.
//!
//! # Export lifetime under a session
//!
//! A [`Session`](crate::session::Session) that applies an `Export` command
//! keeps its own duplicate of the exporter endpoint for as long as the
//! resource is exported. Closing the client's copy therefore does not expire
//! the export; it ends when the resource is released or the session is torn
//! down, both reported as [`ExpirationCause::ResourceDestroyed`].
//! [`ExpirationCause::ExportHandleClosed`] is only produced for exports
//! registered directly against the linker, where the caller owns every
//! handle. Peer closure still applies in both cases.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::command::ResourceKind;
use crate::error::LinkError;
use crate::id::{ExportId, ImportId, Koid, ResourceId, SessionId};
use crate::platform::{EventPair, Port};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A resource offered for import. The exporting session keeps ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExportedResource {
    /// Session that owns the resource.
    pub owner: SessionId,
    /// Resource id within the owning session.
    pub resource: ResourceId,
    /// Kind of the resource.
    pub kind: ResourceKind,
}

/// Why an export was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpirationCause {
    /// The exporting session destroyed the resource.
    ResourceDestroyed,
    /// The peer token closed before any import bound.
    NoImportsBound,
    /// The peer token closed after at least one import bound.
    ImportsClosed,
    /// The exporter closed its own token.
    ExportHandleClosed,
}

/// Outcome delivered to an import's callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportResolution {
    /// The import bound to an export.
    Success(ExportedResource),
    /// The export side closed its token before any export was registered.
    ExportHandleDiedBeforeBind,
    /// The importer destroyed the import before it resolved.
    ImportDestroyedBeforeBind,
}

impl ImportResolution {
    /// The cause without the payload.
    #[must_use]
    pub const fn cause(&self) -> ResolutionCause {
        match self {
            Self::Success(_) => ResolutionCause::Success,
            Self::ExportHandleDiedBeforeBind => ResolutionCause::ExportHandleDiedBeforeBind,
            Self::ImportDestroyedBeforeBind => ResolutionCause::ImportDestroyedBeforeBind,
        }
    }
}

/// Payload-free form of [`ImportResolution`], reported to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionCause {
    /// See [`ImportResolution::Success`].
    Success,
    /// See [`ImportResolution::ExportHandleDiedBeforeBind`].
    ExportHandleDiedBeforeBind,
    /// See [`ImportResolution::ImportDestroyedBeforeBind`].
    ImportDestroyedBeforeBind,
}

/// A record of one export leaving the linker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expiration {
    /// Handle the export was registered under.
    pub export: ExportId,
    /// The resource that was exported.
    pub resource: ExportedResource,
    /// Why it expired.
    pub cause: ExpirationCause,
}

/// Invoked exactly once when an import resolves, with the handle the import
/// was registered under.
pub type ImportCallback = Box<dyn FnOnce(ImportId, ImportResolution)>;

/// Observer for export expiration.
pub type ExpiredObserver = Box<dyn FnMut(&ExportedResource, ExpirationCause)>;

/// Observer for import resolution.
pub type ImportResolvedObserver = Box<dyn FnMut(ImportId, ResolutionCause)>;

// ---------------------------------------------------------------------------
// ResourceLinker
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum LinkerSignal {
    ExportTokenClosed(ExportId),
    ExportPeerClosed(ExportId),
    ImportPeerClosed(ImportId),
}

struct ExportEntry {
    koid: Koid,
    resource: ExportedResource,
    bind_count: u32,
}

struct ImportEntry {
    koid: Koid,
    kind: ResourceKind,
    on_resolved: ImportCallback,
}

/// Tables of pending exports and unresolved imports.
pub struct ResourceLinker {
    exports: HashMap<ExportId, ExportEntry>,
    exports_by_koid: HashMap<Koid, ExportId>,
    imports: HashMap<ImportId, ImportEntry>,
    imports_by_koid: HashMap<Koid, BTreeSet<ImportId>>,
    next_id: u64,
    port: Port<LinkerSignal>,
    on_expired: Option<ExpiredObserver>,
    on_import_resolved: Option<ImportResolvedObserver>,
    expirations: Vec<Expiration>,
}

impl fmt::Debug for ResourceLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLinker")
            .field("exports", &self.exports.len())
            .field("unresolved_imports", &self.imports.len())
            .field("queued_signals", &self.port.len())
            .finish_non_exhaustive()
    }
}

impl Default for ResourceLinker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLinker {
    /// Creates an empty linker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exports: HashMap::new(),
            exports_by_koid: HashMap::new(),
            imports: HashMap::new(),
            imports_by_koid: HashMap::new(),
            next_id: 1,
            port: Port::new(),
            on_expired: None,
            on_import_resolved: None,
            expirations: Vec::new(),
        }
    }

    /// Installs the observer called whenever an export expires.
    pub fn set_on_expired_callback(&mut self, observer: ExpiredObserver) {
        self.on_expired = Some(observer);
    }

    /// Installs the observer called whenever an import resolves.
    pub fn set_on_import_resolved_callback(&mut self, observer: ImportResolvedObserver) {
        self.on_import_resolved = Some(observer);
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Registers `resource` for import through the peer of `token`.
    ///
    /// The caller keeps `token`; closing every handle to it expires the
    /// export with [`ExpirationCause::ExportHandleClosed`]. Pending imports
    /// holding the peer resolve immediately.
    pub fn export_resource(
        &mut self,
        resource: ExportedResource,
        token: &EventPair,
    ) -> Result<ExportId, LinkError> {
        if !token.peer_alive() {
            return Err(LinkError::PeerClosed);
        }
        let koid = token.related_koid();
        if self.exports_by_koid.contains_key(&koid) {
            return Err(LinkError::AlreadyExported(koid));
        }

        let id = ExportId(self.allocate());
        let sender = self.port.sender();
        token.wait_closed_async(&sender, LinkerSignal::ExportTokenClosed(id));
        token.wait_peer_closed_async(&sender, LinkerSignal::ExportPeerClosed(id));

        let pending = self.imports_by_koid.remove(&koid).unwrap_or_default();
        let mut resolved = Vec::with_capacity(pending.len());
        for import in pending {
            if let Some(entry) = self.imports.remove(&import) {
                resolved.push((import, entry));
            }
        }
        self.exports.insert(
            id,
            ExportEntry {
                koid,
                resource,
                bind_count: u32::try_from(resolved.len()).unwrap_or(u32::MAX),
            },
        );
        self.exports_by_koid.insert(koid, id);
        debug!(?id, ?koid, ?resource, binds = resolved.len(), "export registered");

        for (import, entry) in resolved {
            if entry.kind != resource.kind {
                debug!(?import, expected = ?entry.kind, actual = ?resource.kind, "import kind differs from export");
            }
            self.resolve(import, entry.on_resolved, ImportResolution::Success(resource));
        }
        Ok(id)
    }

    /// Registers an import of the resource exported through the peer of
    /// `token`.
    ///
    /// If a matching export exists the callback fires before this returns.
    /// If none exists and the peer is already closed, the callback fires with
    /// [`ImportResolution::ExportHandleDiedBeforeBind`] and an error is
    /// returned.
    pub fn import_resource(
        &mut self,
        kind: ResourceKind,
        token: &EventPair,
        on_resolved: ImportCallback,
    ) -> Result<ImportId, LinkError> {
        let koid = token.koid();
        let id = ImportId(self.allocate());

        let bound = self.exports_by_koid.get(&koid).copied();
        if let Some(export) = bound.and_then(|export| self.exports.get_mut(&export)) {
            export.bind_count += 1;
            let resource = export.resource;
            self.resolve(id, on_resolved, ImportResolution::Success(resource));
            return Ok(id);
        }

        if !token.peer_alive() {
            self.resolve(id, on_resolved, ImportResolution::ExportHandleDiedBeforeBind);
            return Err(LinkError::ExportHandleDiedBeforeBind);
        }

        token.wait_peer_closed_async(&self.port.sender(), LinkerSignal::ImportPeerClosed(id));
        self.imports.insert(
            id,
            ImportEntry {
                koid,
                kind,
                on_resolved,
            },
        );
        self.imports_by_koid.entry(koid).or_default().insert(id);
        debug!(?id, ?koid, "import pending");
        Ok(id)
    }

    /// Destroys an unresolved import. Its callback fires with
    /// [`ImportResolution::ImportDestroyedBeforeBind`].
    pub fn destroy_import(&mut self, import: ImportId) -> Result<(), LinkError> {
        let entry = self
            .take_import(import)
            .ok_or(LinkError::UnknownImport(import))?;
        self.resolve(
            import,
            entry.on_resolved,
            ImportResolution::ImportDestroyedBeforeBind,
        );
        Ok(())
    }

    /// Tells the linker that an exported resource was destroyed by its
    /// owner.
    pub fn on_resource_destroyed(&mut self, export: ExportId) -> Result<(), LinkError> {
        if self.expire(export, ExpirationCause::ResourceDestroyed) {
            Ok(())
        } else {
            Err(LinkError::UnknownExport(export))
        }
    }

    /// Handles token closures queued since the last call. Returns the number
    /// of signals processed.
    pub fn process_signals(&mut self) -> usize {
        let signals: Vec<LinkerSignal> = self.port.drain().collect();
        for signal in &signals {
            match *signal {
                LinkerSignal::ExportTokenClosed(export) => {
                    self.expire(export, ExpirationCause::ExportHandleClosed);
                }
                LinkerSignal::ExportPeerClosed(export) => {
                    let Some(entry) = self.exports.get(&export) else {
                        continue;
                    };
                    let cause = if entry.bind_count == 0 {
                        ExpirationCause::NoImportsBound
                    } else {
                        ExpirationCause::ImportsClosed
                    };
                    self.expire(export, cause);
                }
                LinkerSignal::ImportPeerClosed(import) => {
                    if let Some(entry) = self.take_import(import) {
                        self.resolve(
                            import,
                            entry.on_resolved,
                            ImportResolution::ExportHandleDiedBeforeBind,
                        );
                    }
                }
            }
        }
        signals.len()
    }

    /// Returns and clears the expirations recorded since the last call.
    pub fn take_expirations(&mut self) -> Vec<Expiration> {
        core::mem::take(&mut self.expirations)
    }

    /// The resource registered under `export`, if it has not expired.
    #[must_use]
    pub fn exported_resource(&self, export: ExportId) -> Option<&ExportedResource> {
        self.exports.get(&export).map(|entry| &entry.resource)
    }

    /// Number of live exports.
    #[must_use]
    pub fn num_exports(&self) -> usize {
        self.exports.len()
    }

    /// Number of imports waiting for an export.
    #[must_use]
    pub fn num_unresolved_imports(&self) -> usize {
        self.imports.len()
    }

    /// Number of live exports owned by `session`.
    #[must_use]
    pub fn num_exports_for_session(&self, session: SessionId) -> usize {
        self.exports
            .values()
            .filter(|entry| entry.resource.owner == session)
            .count()
    }

    fn take_import(&mut self, import: ImportId) -> Option<ImportEntry> {
        let entry = self.imports.remove(&import)?;
        if let Some(set) = self.imports_by_koid.get_mut(&entry.koid) {
            set.remove(&import);
            if set.is_empty() {
                self.imports_by_koid.remove(&entry.koid);
            }
        }
        Some(entry)
    }

    fn expire(&mut self, export: ExportId, cause: ExpirationCause) -> bool {
        let Some(entry) = self.exports.remove(&export) else {
            return false;
        };
        self.exports_by_koid.remove(&entry.koid);
        debug!(?export, ?cause, resource = ?entry.resource, "export expired");
        self.expirations.push(Expiration {
            export,
            resource: entry.resource,
            cause,
        });
        if let Some(observer) = self.on_expired.as_mut() {
            observer(&entry.resource, cause);
        }
        true
    }

    fn resolve(&mut self, import: ImportId, callback: ImportCallback, resolution: ImportResolution) {
        debug!(?import, cause = ?resolution.cause(), "import resolved");
        callback(import, resolution);
        if let Some(observer) = self.on_import_resolved.as_mut() {
            observer(import, resolution.cause());
        }
    }
}
