//! Definitions: instructions and phis.
//!
//! Both kinds share one record, [`MirValue`], distinguished by
//! [`MirOp::Phi`]. A definition owns its operand list (ids of other
//! definitions) and a use list of back-references. The graph keeps the two
//! in sync: for every operand edge `consumer.operands[i] == def` there is
//! exactly one `UseSite::Value { consumer, index: i }` in `def.uses`, and for
//! every snapshot operand there is a matching `UseSite::Snapshot`.

use bitflags::bitflags;

use crate::mir::{BlockId, MirOp, MirType, SnapshotId, ValueId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Per-definition properties.
    pub struct DefFlags: u16 {
        /// Has side effects and must be kept
        const EFFECTFUL = 0x0001;
        /// May bail out; kept even without uses
        const GUARD = 0x0002;
        /// Terminates its block
        const CONTROL = 0x0004;
        /// Can be rematerialized from a snapshot on bailout
        const RECOVERABLE = 0x0008;
        /// Kept only for snapshot reconstruction; excluded from codegen
        const RECOVERED_ON_BAILOUT = 0x0010;
        /// Used by something the graph cannot see
        const IMPLICITLY_USED = 0x0020;
        /// Free of ordering constraints
        const MOVABLE = 0x0040;
        /// Phi whose type has been guessed at least once
        const SPECIALIZATION_TRIED = 0x0080;
        /// Float32 candidate whose operands can all produce float32
        const CAN_PRODUCE_FLOAT32 = 0x0100;
        /// Float32 candidate whose consumers can all take float32
        const CAN_CONSUME_FLOAT32 = 0x0200;
    }
}

/// One entry of a definition's use list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSite {
    /// Operand `index` of definition `consumer`
    Value {
        /// The consuming instruction or phi
        consumer: ValueId,
        /// Operand slot in the consumer
        index: usize,
    },
    /// Operand `index` of a deopt snapshot
    Snapshot {
        /// The capturing snapshot
        snapshot: SnapshotId,
        /// Operand slot in the snapshot
        index: usize,
    },
}

impl UseSite {
    /// Returns the consuming definition, if this is not a snapshot use.
    #[must_use]
    pub const fn consumer(&self) -> Option<ValueId> {
        match self {
            UseSite::Value { consumer, .. } => Some(*consumer),
            UseSite::Snapshot { .. } => None,
        }
    }
}

/// An SSA definition.
#[derive(Debug, Clone)]
pub struct MirValue {
    pub(crate) id: ValueId,
    pub(crate) block: BlockId,
    pub(crate) op: MirOp,
    pub(crate) operands: Vec<ValueId>,
    pub(crate) uses: Vec<UseSite>,
    pub(crate) ty: MirType,
    pub(crate) flags: DefFlags,
    pub(crate) snapshot: Option<SnapshotId>,
}

impl MirValue {
    pub(crate) fn new(id: ValueId, block: BlockId, op: MirOp, ty: MirType) -> Self {
        let flags = op.base_flags();
        MirValue {
            id,
            block,
            op,
            operands: Vec::new(),
            uses: Vec::new(),
            ty,
            flags,
            snapshot: None,
        }
    }

    /// Returns this definition's id.
    #[must_use]
    pub const fn id(&self) -> ValueId {
        self.id
    }

    /// Returns the block holding this definition.
    #[must_use]
    pub const fn block(&self) -> BlockId {
        self.block
    }

    /// Returns the operation.
    #[must_use]
    pub const fn op(&self) -> &MirOp {
        &self.op
    }

    /// Returns the operands in slot order.
    #[must_use]
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    /// Returns operand `index`, if present.
    #[must_use]
    pub fn operand(&self, index: usize) -> Option<ValueId> {
        self.operands.get(index).copied()
    }

    /// Returns the use list.
    #[must_use]
    pub fn uses(&self) -> &[UseSite] {
        &self.uses
    }

    /// Returns `true` if anything, including a snapshot, uses this definition.
    #[must_use]
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Returns the value type.
    #[must_use]
    pub const fn ty(&self) -> MirType {
        self.ty
    }

    /// Returns the flags.
    #[must_use]
    pub const fn flags(&self) -> DefFlags {
        self.flags
    }

    /// Returns `true` if all of `flags` are set.
    #[must_use]
    pub const fn has(&self, flags: DefFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Returns the snapshot attached after this instruction.
    #[must_use]
    pub const fn snapshot(&self) -> Option<SnapshotId> {
        self.snapshot
    }

    /// Returns `true` for phis.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        self.op.is_phi()
    }

    /// Returns `true` if removing this definition is unobservable once it
    /// has no uses.
    #[must_use]
    pub fn is_pure(&self) -> bool {
        !self
            .flags
            .intersects(DefFlags::EFFECTFUL | DefFlags::GUARD | DefFlags::CONTROL)
    }

    pub(crate) fn set_flag(&mut self, flag: DefFlags, value: bool) {
        self.flags.set(flag, value);
    }
}
