//! Basic blocks.
//!
//! A block holds ids only: its phis (all at the head), its instructions in
//! execution order with the control instruction last, and its CFG and
//! dominator-tree links. The graph owns every block; a block's list of
//! dominated children holds references, not ownership.
//!
//! # Block Structure
//!
//! ```text
//! block3 (#3) preds=[block1, block2] idom=block0
//!   v7 = phi(v4, v5)
//!   v8 = add v7, v7
//!   v9 = return v8
//! ```
//!
//! Phi operand `i` flows in from predecessor `i`, so predecessor order is
//! significant and is preserved by every edge rewrite.

use crate::mir::{BlockId, SnapshotId, ValueId};

/// Why a block exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Built by the frontend
    Normal,
    /// Inserted on a critical edge
    SplitEdge,
    /// Entry point for on-stack replacement
    Osr,
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct MirBlock {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    /// Position in reverse post-order, assigned by renumbering.
    pub(crate) number: usize,
    pub(crate) phis: Vec<ValueId>,
    pub(crate) instructions: Vec<ValueId>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) successors: Vec<BlockId>,
    pub(crate) entry_snapshot: Option<SnapshotId>,

    pub(crate) idom: Option<BlockId>,
    pub(crate) dominated: Vec<BlockId>,
    pub(crate) num_dominated: usize,
    pub(crate) dom_index: usize,

    pub(crate) loop_depth: u32,
    /// Set on loop headers: the predecessor closing the loop.
    pub(crate) backedge: Option<BlockId>,
}

impl MirBlock {
    pub(crate) fn new(id: BlockId, kind: BlockKind) -> Self {
        MirBlock {
            id,
            kind,
            number: id.index(),
            phis: Vec::new(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            entry_snapshot: None,
            idom: None,
            dominated: Vec::new(),
            num_dominated: 0,
            dom_index: 0,
            loop_depth: 0,
            backedge: None,
        }
    }

    /// Returns the block id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns why the block exists.
    #[must_use]
    pub const fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns the reverse post-order number.
    #[must_use]
    pub const fn number(&self) -> usize {
        self.number
    }

    /// Returns the phis at the block head.
    #[must_use]
    pub fn phis(&self) -> &[ValueId] {
        &self.phis
    }

    /// Returns the instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[ValueId] {
        &self.instructions
    }

    /// Returns the terminating instruction.
    #[must_use]
    pub fn last_instruction(&self) -> Option<ValueId> {
        self.instructions.last().copied()
    }

    /// Returns the predecessors; phi operand `i` flows in from predecessor `i`.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Returns the successors; for a `Test`, index 0 is the taken branch.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Returns the snapshot taken at block entry.
    #[must_use]
    pub const fn entry_snapshot(&self) -> Option<SnapshotId> {
        self.entry_snapshot
    }

    /// Returns the immediate dominator; roots dominate themselves.
    #[must_use]
    pub const fn immediate_dominator(&self) -> Option<BlockId> {
        self.idom
    }

    /// Returns `true` if the block is a root of the dominator tree.
    #[must_use]
    pub fn is_dominator_root(&self) -> bool {
        self.idom == Some(self.id)
    }

    /// Returns the immediately dominated blocks.
    #[must_use]
    pub fn dominated(&self) -> &[BlockId] {
        &self.dominated
    }

    /// Returns the number of blocks this block dominates, itself included.
    #[must_use]
    pub const fn num_dominated(&self) -> usize {
        self.num_dominated
    }

    /// Returns the pre-order index of the block in the dominator tree.
    #[must_use]
    pub const fn dom_index(&self) -> usize {
        self.dom_index
    }

    /// Returns the loop nesting depth.
    #[must_use]
    pub const fn loop_depth(&self) -> u32 {
        self.loop_depth
    }

    /// Returns `true` for loop headers.
    #[must_use]
    pub const fn is_loop_header(&self) -> bool {
        self.backedge.is_some()
    }

    /// Returns the back-edge predecessor of a loop header.
    #[must_use]
    pub const fn backedge(&self) -> Option<BlockId> {
        self.backedge
    }
}
