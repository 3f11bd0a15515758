//! Stable arena identifiers for blocks, values and snapshots.
//!
//! Every entity of a [`MirGraph`](crate::mir::MirGraph) lives in an arena and
//! is addressed by one of these newtypes. Ids are assigned sequentially, are
//! never reused, and keep pointing at a tombstone once their entity has been
//! discarded. Operand lists, use lists and dominator links are all plain id
//! vectors, so cycles between loop phis carry no ownership.

use std::fmt;

use crate::utils::EntityId;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            /// Creates an id from a raw arena index.
            #[must_use]
            #[inline]
            pub const fn new(index: usize) -> Self {
                $name(index)
            }

            /// Returns the raw arena index.
            #[must_use]
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl EntityId for $name {
            #[inline]
            fn new(index: usize) -> Self {
                $name(index)
            }

            #[inline]
            fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a basic block in its graph's block arena.
    BlockId,
    "block"
);

entity_id!(
    /// Identifies a definition (an instruction or a phi) in the value arena.
    ValueId,
    "v"
);

entity_id!(
    /// Identifies a deopt snapshot in the snapshot arena.
    SnapshotId,
    "rp"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(BlockId::new(2).to_string(), "block2");
        assert_eq!(ValueId::new(14).to_string(), "v14");
        assert_eq!(format!("{:?}", SnapshotId::new(0)), "rp0");
    }

    #[test]
    fn test_ordering_follows_index() {
        assert!(ValueId::new(1) < ValueId::new(2));
        assert_eq!(<BlockId as EntityId>::index(BlockId::new(7)), 7);
    }
}
