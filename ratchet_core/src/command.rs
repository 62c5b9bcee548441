// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene mutation commands submitted by clients.

use crate::id::ResourceId;
use crate::platform::EventPair;

/// The kind of a session resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A scene node that can hold children.
    Node,
    /// Image content that can be attached to nodes by the renderer.
    Image,
    /// An opaque buffer.
    Buffer,
}

impl ResourceKind {
    /// Short lowercase name, used in scene dumps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Image => "image",
            Self::Buffer => "buffer",
        }
    }
}

/// One scene mutation.
///
/// Batches are `Vec<Command>`, applied in order when their present request
/// becomes due.
#[derive(Debug)]
pub enum Command {
    /// Create a resource.
    Create {
        /// New resource id, unique within the session.
        id: ResourceId,
        /// What to create.
        kind: ResourceKind,
    },
    /// Release a resource. Exports of the resource expire.
    Release {
        /// Resource to release.
        id: ResourceId,
    },
    /// Attach `child` under `parent`, detaching it from any previous parent.
    AddChild {
        /// Parent node.
        parent: ResourceId,
        /// Child node.
        child: ResourceId,
    },
    /// Detach a node from its parent.
    Detach {
        /// Node to detach.
        id: ResourceId,
    },
    /// Set a client-defined tag on a resource, shown in scene dumps.
    SetTag {
        /// Resource to tag.
        id: ResourceId,
        /// Tag value.
        tag: u32,
    },
    /// Export a resource through the peer of `token`.
    Export {
        /// Resource to export.
        id: ResourceId,
        /// Token whose peer identifies the export.
        token: EventPair,
    },
    /// Import the resource exported through the peer of `token` as `id`.
    Import {
        /// Local id for the imported resource.
        id: ResourceId,
        /// Expected kind of the exported resource.
        kind: ResourceKind,
        /// Token identifying the export.
        token: EventPair,
    },
}

impl Command {
    /// The resource the command primarily acts on.
    #[must_use]
    pub fn target(&self) -> ResourceId {
        match self {
            Self::Create { id, .. }
            | Self::Release { id }
            | Self::Detach { id }
            | Self::SetTag { id, .. }
            | Self::Export { id, .. }
            | Self::Import { id, .. } => *id,
            Self::AddChild { child, .. } => *child,
        }
    }
}
