// Copyright 2026 the Ratchet Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifier newtypes.

use core::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a client session. Assigned once by the engine, never reused.
    SessionId,
    "SessionId"
);

id_type!(
    /// Session-local sequence number of a present call, strictly increasing.
    PresentId,
    "PresentId"
);

id_type!(
    /// Client-chosen identifier of a resource within one session.
    ResourceId,
    "ResourceId"
);

id_type!(
    /// Handle to a registered export in a
    /// [`ResourceLinker`](crate::linker::ResourceLinker).
    ExportId,
    "ExportId"
);

id_type!(
    /// Handle to a registered import in a
    /// [`ResourceLinker`](crate::linker::ResourceLinker).
    ImportId,
    "ImportId"
);

id_type!(
    /// Kernel-object identity of one endpoint of a platform object.
    ///
    /// Duplicated handles share a koid.
    Koid,
    "Koid"
);

/// Hands out monotonically increasing [`SessionId`]s.
#[derive(Debug, Default)]
pub struct SessionIdAllocator {
    next: u64,
}

impl SessionIdAllocator {
    /// Creates an allocator whose first id is `1`.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns a fresh id.
    pub fn allocate(&mut self) -> SessionId {
        let id = SessionId(self.next.max(1));
        self.next = id.0 + 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_never_reused() {
        let mut ids = SessionIdAllocator::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_eq!(a, SessionId(1));
        assert!(b > a, "ids must increase");

        let mut from_default = SessionIdAllocator::default();
        assert_eq!(from_default.allocate(), SessionId(1), "zero is never handed out");
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{:?}", SessionId(3)), "SessionId(3)");
        assert_eq!(format!("{}", ResourceId(7)), "ResourceId#7");
    }
}
