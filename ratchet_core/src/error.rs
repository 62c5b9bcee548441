// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.
//!
//! Each concern has its own enum. Errors returned to a client call are
//! session-fatal unless noted otherwise; resource-link races are reported
//! through resolution causes, not through these types.

use thiserror::Error;

use crate::id::{ExportId, ImportId, Koid, ResourceId, SessionId};
use crate::time::HostTime;

/// A client present call was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentError {
    /// The requested presentation time is earlier than one already scheduled.
    #[error("presentation time {requested:?} is earlier than {last_scheduled:?}")]
    OutOfOrder {
        /// Time the client asked for.
        requested: HostTime,
        /// Latest time previously scheduled by this session.
        last_scheduled: HostTime,
    },

    /// The session has no present credit left.
    #[error("present budget exhausted ({in_flight} presents in flight)")]
    BudgetExhausted {
        /// Presents queued or awaiting presentation.
        in_flight: u32,
    },

    /// The session does not exist or has been torn down.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// A resource export or import could not be registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The export's destination token has no live peer.
    #[error("peer of export token is already closed")]
    PeerClosed,

    /// Another export is already registered under the same token identity.
    #[error("a resource is already exported under {0:?}")]
    AlreadyExported(Koid),

    /// The import's source token lost its peer before any export arrived.
    #[error("export handle died before bind")]
    ExportHandleDiedBeforeBind,

    /// No export is registered under this handle.
    #[error("unknown export {0:?}")]
    UnknownExport(ExportId),

    /// No unresolved import is registered under this handle.
    #[error("unknown import {0:?}")]
    UnknownImport(ImportId),
}

/// A command in a session's batch could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// A resource with this id already exists in the session.
    #[error("resource {0} already exists")]
    DuplicateResource(ResourceId),

    /// No resource with this id exists in the session.
    #[error("resource {0} does not exist")]
    UnknownResource(ResourceId),

    /// The resource cannot take part in the node hierarchy.
    #[error("resource {0} is not a node")]
    NotANode(ResourceId),

    /// Attaching the child would make a node its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle {
        /// Prospective parent.
        parent: ResourceId,
        /// Prospective child.
        child: ResourceId,
    },

    /// The resource is already exported.
    #[error("resource {0} is already exported")]
    AlreadyExported(ResourceId),

    /// The linker rejected an export or import.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Configuration could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid TOML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// The rendering backend failed to produce a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Backend-specific failure description.
    #[error("render backend failed: {0}")]
    Backend(String),
}
