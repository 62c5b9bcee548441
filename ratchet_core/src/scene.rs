// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scene graph seam.
//!
//! Sessions validate commands against their own resource maps and then hand
//! them to a [`SceneGraph`]. The default implementation, [`NodeTree`], keeps
//! one node hierarchy per session and can dump it as text.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::command::{Command, ResourceKind};
use crate::error::ApplyError;
use crate::id::{ResourceId, SessionId};

/// Receives validated commands from sessions.
pub trait SceneGraph {
    /// Applies one command on behalf of `session`.
    fn apply_command(&mut self, session: SessionId, command: &Command) -> Result<(), ApplyError>;

    /// Drops everything `session` contributed.
    fn remove_session(&mut self, session: SessionId);

    /// Whether there is anything to draw.
    fn has_content(&self) -> bool;

    /// Human-readable description of the scene.
    fn dump(&self) -> String;
}

#[derive(Clone, Debug)]
struct SceneNode {
    kind: ResourceKind,
    imported: bool,
    tag: Option<u32>,
    parent: Option<ResourceId>,
    children: Vec<ResourceId>,
}

impl SceneNode {
    fn new(kind: ResourceKind, imported: bool) -> Self {
        Self {
            kind,
            imported,
            tag: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

type SessionNodes = BTreeMap<ResourceId, SceneNode>;

/// A per-session tree of resources.
#[derive(Clone, Debug, Default)]
pub struct NodeTree {
    sessions: BTreeMap<SessionId, SessionNodes>,
}

impl NodeTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes contributed by `session`.
    #[must_use]
    pub fn node_count(&self, session: SessionId) -> usize {
        self.sessions.get(&session).map_or(0, BTreeMap::len)
    }

    /// Parent of `id` in `session`, if attached.
    #[must_use]
    pub fn parent(&self, session: SessionId, id: ResourceId) -> Option<ResourceId> {
        self.sessions.get(&session)?.get(&id)?.parent
    }

    fn detach(nodes: &mut SessionNodes, id: ResourceId) {
        let Some(parent) = nodes.get_mut(&id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = nodes.get_mut(&parent) {
            parent.children.retain(|c| *c != id);
        }
    }

    fn is_ancestor(nodes: &SessionNodes, ancestor: ResourceId, mut id: ResourceId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match nodes.get(&id).and_then(|n| n.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn dump_node(out: &mut String, nodes: &SessionNodes, id: ResourceId, depth: usize) {
        let Some(node) = nodes.get(&id) else {
            return;
        };
        let _ = write!(out, "{:indent$}{} {}", "", node.kind.name(), id.0, indent = depth * 2);
        if let Some(tag) = node.tag {
            let _ = write!(out, " tag={tag}");
        }
        if node.imported {
            out.push_str(" (imported)");
        }
        out.push('\n');
        for child in &node.children {
            Self::dump_node(out, nodes, *child, depth + 1);
        }
    }
}

impl SceneGraph for NodeTree {
    fn apply_command(&mut self, session: SessionId, command: &Command) -> Result<(), ApplyError> {
        let nodes = self.sessions.entry(session).or_default();
        match command {
            Command::Create { id, kind } => {
                if nodes.contains_key(id) {
                    return Err(ApplyError::DuplicateResource(*id));
                }
                nodes.insert(*id, SceneNode::new(*kind, false));
            }
            Command::Import { id, kind, .. } => {
                if nodes.contains_key(id) {
                    return Err(ApplyError::DuplicateResource(*id));
                }
                nodes.insert(*id, SceneNode::new(*kind, true));
            }
            Command::Release { id } => {
                Self::detach(nodes, *id);
                let node = nodes.remove(id).ok_or(ApplyError::UnknownResource(*id))?;
                for child in node.children {
                    if let Some(child) = nodes.get_mut(&child) {
                        child.parent = None;
                    }
                }
            }
            Command::AddChild { parent, child } => {
                for id in [parent, child] {
                    let node = nodes.get(id).ok_or(ApplyError::UnknownResource(*id))?;
                    if node.kind != ResourceKind::Node && id == parent {
                        return Err(ApplyError::NotANode(*id));
                    }
                }
                if Self::is_ancestor(nodes, *child, *parent) {
                    return Err(ApplyError::Cycle {
                        parent: *parent,
                        child: *child,
                    });
                }
                Self::detach(nodes, *child);
                if let Some(node) = nodes.get_mut(child) {
                    node.parent = Some(*parent);
                }
                if let Some(node) = nodes.get_mut(parent) {
                    node.children.push(*child);
                }
            }
            Command::Detach { id } => {
                if !nodes.contains_key(id) {
                    return Err(ApplyError::UnknownResource(*id));
                }
                Self::detach(nodes, *id);
            }
            Command::SetTag { id, tag } => {
                let node = nodes.get_mut(id).ok_or(ApplyError::UnknownResource(*id))?;
                node.tag = Some(*tag);
            }
            Command::Export { id, .. } => {
                if !nodes.contains_key(id) {
                    return Err(ApplyError::UnknownResource(*id));
                }
            }
        }
        Ok(())
    }

    fn remove_session(&mut self, session: SessionId) {
        self.sessions.remove(&session);
    }

    fn has_content(&self) -> bool {
        self.sessions.values().any(|nodes| !nodes.is_empty())
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        for (session, nodes) in &self.sessions {
            if nodes.is_empty() {
                continue;
            }
            let _ = writeln!(out, "session {}", session.0);
            for (id, node) in nodes {
                if node.parent.is_none() {
                    Self::dump_node(&mut out, nodes, *id, 1);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: SessionId = SessionId(1);

    fn create(tree: &mut NodeTree, id: u64, kind: ResourceKind) {
        tree.apply_command(
            S,
            &Command::Create {
                id: ResourceId(id),
                kind,
            },
        )
        .unwrap();
    }

    fn add_child(tree: &mut NodeTree, parent: u64, child: u64) -> Result<(), ApplyError> {
        tree.apply_command(
            S,
            &Command::AddChild {
                parent: ResourceId(parent),
                child: ResourceId(child),
            },
        )
    }

    #[test]
    fn hierarchy_and_dump() {
        let mut tree = NodeTree::new();
        assert!(!tree.has_content());
        create(&mut tree, 1, ResourceKind::Node);
        create(&mut tree, 2, ResourceKind::Node);
        create(&mut tree, 3, ResourceKind::Image);
        add_child(&mut tree, 1, 2).unwrap();
        add_child(&mut tree, 2, 3).unwrap();
        tree.apply_command(
            S,
            &Command::SetTag {
                id: ResourceId(2),
                tag: 9,
            },
        )
        .unwrap();

        assert!(tree.has_content());
        assert_eq!(
            tree.dump(),
            "session 1\n  node 1\n    node 2 tag=9\n      image 3\n"
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = NodeTree::new();
        create(&mut tree, 1, ResourceKind::Node);
        create(&mut tree, 2, ResourceKind::Node);
        add_child(&mut tree, 1, 2).unwrap();
        assert_eq!(
            add_child(&mut tree, 2, 1),
            Err(ApplyError::Cycle {
                parent: ResourceId(2),
                child: ResourceId(1),
            })
        );
        assert_eq!(
            add_child(&mut tree, 1, 1),
            Err(ApplyError::Cycle {
                parent: ResourceId(1),
                child: ResourceId(1),
            }),
            "a node cannot parent itself"
        );
    }

    #[test]
    fn reparenting_moves_child() {
        let mut tree = NodeTree::new();
        for id in 1..=3 {
            create(&mut tree, id, ResourceKind::Node);
        }
        add_child(&mut tree, 1, 3).unwrap();
        add_child(&mut tree, 2, 3).unwrap();
        assert_eq!(tree.parent(S, ResourceId(3)), Some(ResourceId(2)));
        assert_eq!(tree.dump(), "session 1\n  node 1\n  node 2\n    node 3\n");
    }

    #[test]
    fn images_cannot_hold_children() {
        let mut tree = NodeTree::new();
        create(&mut tree, 1, ResourceKind::Image);
        create(&mut tree, 2, ResourceKind::Node);
        assert_eq!(add_child(&mut tree, 1, 2), Err(ApplyError::NotANode(ResourceId(1))));
    }

    #[test]
    fn release_orphans_children_and_remove_session_clears() {
        let mut tree = NodeTree::new();
        create(&mut tree, 1, ResourceKind::Node);
        create(&mut tree, 2, ResourceKind::Node);
        add_child(&mut tree, 1, 2).unwrap();
        tree.apply_command(S, &Command::Release { id: ResourceId(1) })
            .unwrap();
        assert_eq!(tree.parent(S, ResourceId(2)), None);
        assert_eq!(tree.node_count(S), 1);

        tree.remove_session(S);
        assert!(!tree.has_content());
        assert_eq!(tree.dump(), "");
    }
}
