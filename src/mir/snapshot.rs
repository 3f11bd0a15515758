//! Deopt snapshots ("resume points").
//!
//! A snapshot lists the values needed to rebuild interpreter state if
//! compiled code bails out at its program point. Operands are ordinary uses
//! of their definitions. Observable operands are slots the interpreter will
//! read after resuming; unobservable ones are only kept for reconstruction
//! and may be replaced by the optimized-out constant once their value is
//! provably dead.

use crate::mir::{BlockId, SnapshotId, ValueId};

/// Where a snapshot sits in its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotAnchor {
    /// Block entry, before any instruction
    Entry,
    /// Immediately after the given instruction
    After(ValueId),
}

/// One captured slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotOperand {
    /// The captured definition
    pub value: ValueId,
    /// Whether the interpreter reads this slot after resuming
    pub observable: bool,
}

/// A deopt snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) id: SnapshotId,
    pub(crate) block: BlockId,
    pub(crate) anchor: SnapshotAnchor,
    pub(crate) operands: Vec<SnapshotOperand>,
}

impl Snapshot {
    /// Returns this snapshot's id.
    #[must_use]
    pub const fn id(&self) -> SnapshotId {
        self.id
    }

    /// Returns the block the snapshot belongs to.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the attachment point.
    #[must_use]
    pub const fn anchor(&self) -> SnapshotAnchor {
        self.anchor
    }

    /// Returns the captured slots.
    #[must_use]
    pub fn operands(&self) -> &[SnapshotOperand] {
        &self.operands
    }

    /// Returns the owning instruction, if attached after one.
    #[must_use]
    pub const fn owner(&self) -> Option<ValueId> {
        match self.anchor {
            SnapshotAnchor::After(owner) => Some(owner),
            SnapshotAnchor::Entry => None,
        }
    }
}
