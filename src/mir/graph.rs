//! The IR graph: arenas of blocks, definitions and snapshots.
//!
//! [`MirGraph`] owns every entity of one compilation unit. Entities are
//! addressed by stable ids and never move; discarding one leaves a tombstone
//! so stale ids fail loudly instead of aliasing a new entity.
//!
//! All mutations that touch operands go through the graph so that operand
//! lists and use lists stay in sync. In particular:
//!
//! - [`MirGraph::set_operand`] and [`MirGraph::set_snapshot_operand`] move
//!   a single edge
//! - [`MirGraph::replace_all_uses_with`] moves every use of a definition
//! - [`MirGraph::discard`] unlinks a definition's operands, drops its
//!   attached snapshot and removes it from its block in one step
//!
//! Indexing with `graph[id]` panics on a discarded id; that is always a bug
//! in the caller. The `try_*` accessors return `Option` instead.

use std::ops::Index;

use bitflags::bitflags;

use crate::{
    mir::{
        BlockId, BlockKind, ConstValue, MirBlock, MirOp, MirType, MirValue, Snapshot,
        SnapshotAnchor, SnapshotId, SnapshotOperand, UseSite, ValueId,
    },
    Error, Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Invariants the graph currently satisfies.
    ///
    /// Passes set the property they establish; mutations that can break one
    /// clear it. The verifier checks exactly the properties that are set.
    pub struct GraphProperties: u8 {
        /// No block with several successors feeds a block with several predecessors
        const CRITICAL_EDGES_SPLIT = 0x01;
        /// Immediate dominators, dominated counts and pre-order indices are current
        const DOMINATOR_TREE = 0x02;
        /// No redundant or unobservable phis remain
        const PHIS_REDUCED = 0x04;
        /// Every phi has a concrete type and type-consistent operands
        const TYPES_SPECIALIZED = 0x08;
    }
}

/// The SSA graph of one compilation unit.
#[derive(Debug, Clone)]
pub struct MirGraph {
    name: String,
    blocks: Vec<Option<MirBlock>>,
    order: Vec<BlockId>,
    values: Vec<Option<MirValue>>,
    snapshots: Vec<Option<Snapshot>>,
    entry: BlockId,
    osr: Option<BlockId>,
    has_try_block: bool,
    properties: GraphProperties,
}

impl MirGraph {
    /// Creates a graph holding a single, empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let entry = BlockId::new(0);
        MirGraph {
            name: name.into(),
            blocks: vec![Some(MirBlock::new(entry, BlockKind::Normal))],
            order: vec![entry],
            values: Vec::new(),
            snapshots: Vec::new(),
            entry,
            osr: None,
            has_try_block: false,
            properties: GraphProperties::empty(),
        }
    }

    // ── Graph-level accessors ───────────────────────────────────────────

    /// Returns the unit name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry block.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.entry
    }

    /// Returns the on-stack-replacement entry block, if any.
    #[must_use]
    pub const fn osr_block(&self) -> Option<BlockId> {
        self.osr
    }

    /// Returns the roots: the entry block, then the OSR block.
    pub fn roots(&self) -> impl Iterator<Item = BlockId> {
        std::iter::once(self.entry).chain(self.osr)
    }

    /// Returns `true` if the unit contains exception handlers.
    #[must_use]
    pub const fn has_try_block(&self) -> bool {
        self.has_try_block
    }

    /// Records whether the unit contains exception handlers.
    pub fn set_has_try_block(&mut self, value: bool) {
        self.has_try_block = value;
    }

    /// Returns the invariants currently established.
    #[must_use]
    pub const fn properties(&self) -> GraphProperties {
        self.properties
    }

    /// Marks `property` as established or lost.
    pub fn set_property(&mut self, property: GraphProperties, value: bool) {
        self.properties.set(property, value);
    }

    /// Returns the block order. After dominator construction this is
    /// reverse post-order.
    #[must_use]
    pub fn block_order(&self) -> &[BlockId] {
        &self.order
    }

    /// Returns the number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    /// Iterates over live blocks in block order.
    pub fn blocks(&self) -> impl Iterator<Item = &MirBlock> + '_ {
        self.order.iter().filter_map(|id| self.try_block(*id))
    }

    /// Iterates over live definitions in id order.
    pub fn values(&self) -> impl Iterator<Item = &MirValue> + '_ {
        self.values.iter().flatten()
    }

    /// Iterates over live snapshots in id order.
    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> + '_ {
        self.snapshots.iter().flatten()
    }

    /// Returns the size of the value arena, tombstones included.
    ///
    /// Every value id ever handed out is below this bound.
    #[must_use]
    pub fn value_capacity(&self) -> usize {
        self.values.len()
    }

    /// Returns the size of the block arena, tombstones included.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Returns a block unless it was discarded.
    #[must_use]
    pub fn try_block(&self, id: BlockId) -> Option<&MirBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns a definition unless it was discarded.
    #[must_use]
    pub fn try_value(&self, id: ValueId) -> Option<&MirValue> {
        self.values.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns a snapshot unless it was discarded.
    #[must_use]
    pub fn try_snapshot(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.snapshots.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns `true` if `id` names a live definition.
    #[must_use]
    pub fn contains_value(&self, id: ValueId) -> bool {
        self.try_value(id).is_some()
    }

    /// Returns `true` if any definition is typed float32.
    #[must_use]
    pub fn contains_float32(&self) -> bool {
        self.values().any(|v| v.ty == MirType::Float32)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut MirBlock {
        match self.blocks.get_mut(id.index()) {
            Some(Some(block)) => block,
            _ => panic!("{id} is not a live block"),
        }
    }

    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut MirValue {
        match self.values.get_mut(id.index()) {
            Some(Some(value)) => value,
            _ => panic!("{id} is not a live value"),
        }
    }

    pub(crate) fn snapshot_mut(&mut self, id: SnapshotId) -> &mut Snapshot {
        match self.snapshots.get_mut(id.index()) {
            Some(Some(snapshot)) => snapshot,
            _ => panic!("{id} is not a live snapshot"),
        }
    }

    pub(crate) fn set_order(&mut self, order: Vec<BlockId>) {
        self.order = order;
    }

    // ── Blocks and edges ────────────────────────────────────────────────

    /// Appends a new empty block to the block order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn add_block(&mut self) -> Result<BlockId> {
        let id = self.alloc_block(BlockKind::Normal)?;
        self.order.push(id);
        Ok(id)
    }

    /// Inserts a new empty block right after `after` in the block order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn insert_block_after(&mut self, after: BlockId, kind: BlockKind) -> Result<BlockId> {
        let id = self.alloc_block(kind)?;
        let position = self
            .order
            .iter()
            .position(|&b| b == after)
            .map_or(self.order.len(), |p| p + 1);
        self.order.insert(position, id);
        Ok(id)
    }

    fn alloc_block(&mut self, kind: BlockKind) -> Result<BlockId> {
        self.blocks.try_reserve(1)?;
        self.order.try_reserve(1)?;
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Some(MirBlock::new(id, kind)));
        Ok(id)
    }

    /// Declares `block` as the on-stack-replacement entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block has predecessors.
    pub fn set_osr_block(&mut self, block: BlockId) -> Result<()> {
        if !self[block].predecessors.is_empty() {
            return Err(Error::GraphError(format!(
                "OSR block {block} must not have predecessors"
            )));
        }
        self.block_mut(block).kind = BlockKind::Osr;
        self.osr = Some(block);
        self.properties.remove(GraphProperties::DOMINATOR_TREE);
        Ok(())
    }

    /// Adds a CFG edge. Phis of `to` must receive one more operand for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if an edge list cannot grow.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        self.block_mut(from).successors.try_reserve(1)?;
        self.block_mut(to).predecessors.try_reserve(1)?;
        self.block_mut(from).successors.push(to);
        self.block_mut(to).predecessors.push(from);
        self.properties
            .remove(GraphProperties::CRITICAL_EDGES_SPLIT | GraphProperties::DOMINATOR_TREE);
        Ok(())
    }

    /// Marks `header` as a loop header closed by `backedge`.
    pub fn set_loop_header(&mut self, header: BlockId, backedge: BlockId) {
        self.block_mut(header).backedge = Some(backedge);
    }

    /// Sets the loop nesting depth of `block`.
    pub fn set_loop_depth(&mut self, block: BlockId, depth: u32) {
        self.block_mut(block).loop_depth = depth;
    }

    /// Splits the edge from `pred` to its successor `successor_index` by
    /// inserting an empty block ending in a `Goto`.
    ///
    /// The new block takes the place of `pred` in the target's predecessor
    /// list, so phi operands of the target stay aligned. A split back edge
    /// becomes the loop header's back edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the target does not list `pred` as a
    /// predecessor, or [`Error::OutOfMemory`].
    pub fn split_edge(&mut self, pred: BlockId, successor_index: usize) -> Result<BlockId> {
        let Some(&target) = self[pred].successors.get(successor_index) else {
            return Err(Error::GraphError(format!(
                "{pred} has no successor {successor_index}"
            )));
        };
        let Some(pred_index) = self[target].predecessors.iter().position(|&p| p == pred) else {
            return Err(malformed_error!(
                "{} lists {} as successor but not as predecessor",
                pred,
                target
            ));
        };

        let split = self.insert_block_after(pred, BlockKind::SplitEdge)?;
        let depth = self[pred].loop_depth.min(self[target].loop_depth);
        {
            let block = self.block_mut(split);
            block.loop_depth = depth;
            block.predecessors.push(pred);
            block.successors.push(target);
        }
        self.block_mut(pred).successors[successor_index] = split;
        self.block_mut(target).predecessors[pred_index] = split;
        if self[target].backedge == Some(pred) {
            self.block_mut(target).backedge = Some(split);
        }
        self.append(split, MirOp::Goto, &[])?;
        self.properties.remove(GraphProperties::DOMINATOR_TREE);
        Ok(split)
    }

    // ── Definitions ─────────────────────────────────────────────────────

    /// Appends an instruction at the end of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if an operand is not live, or
    /// [`Error::OutOfMemory`].
    pub fn append(&mut self, block: BlockId, op: MirOp, operands: &[ValueId]) -> Result<ValueId> {
        let id = self.create(block, op, operands)?;
        let instructions = &mut self.block_mut(block).instructions;
        instructions.try_reserve(1)?;
        instructions.push(id);
        Ok(id)
    }

    /// Inserts an instruction immediately before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if `anchor` is not an instruction in a
    /// block or an operand is not live, or [`Error::OutOfMemory`].
    pub fn insert_before(
        &mut self,
        anchor: ValueId,
        op: MirOp,
        operands: &[ValueId],
    ) -> Result<ValueId> {
        let block = self[anchor].block;
        let Some(position) = self.position_in_block(anchor) else {
            return Err(Error::GraphError(format!(
                "{anchor} is not an instruction of {block}"
            )));
        };
        self.insert_at(block, position, op, operands)
    }

    /// Inserts an instruction before the terminator of `block`, or at its
    /// end if it has none yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if an operand is not live, or
    /// [`Error::OutOfMemory`].
    pub fn insert_before_terminator(
        &mut self,
        block: BlockId,
        op: MirOp,
        operands: &[ValueId],
    ) -> Result<ValueId> {
        let instructions = &self[block].instructions;
        let position = match instructions.last() {
            Some(&last) if self[last].op.is_control() => instructions.len() - 1,
            _ => instructions.len(),
        };
        self.insert_at(block, position, op, operands)
    }

    /// Inserts an instruction at the start of `block`, after its phis.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if an operand is not live, or
    /// [`Error::OutOfMemory`].
    pub fn insert_at_start(
        &mut self,
        block: BlockId,
        op: MirOp,
        operands: &[ValueId],
    ) -> Result<ValueId> {
        self.insert_at(block, 0, op, operands)
    }

    fn insert_at(
        &mut self,
        block: BlockId,
        position: usize,
        op: MirOp,
        operands: &[ValueId],
    ) -> Result<ValueId> {
        let id = self.create(block, op, operands)?;
        let instructions = &mut self.block_mut(block).instructions;
        instructions.try_reserve(1)?;
        instructions.insert(position, id);
        Ok(id)
    }

    /// Adds a phi at the head of `block`, one operand per predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the operand count does not match the
    /// predecessor count or an operand is not live, or [`Error::OutOfMemory`].
    pub fn add_phi(&mut self, block: BlockId, operands: &[ValueId]) -> Result<ValueId> {
        let expected = self[block].predecessors.len();
        if operands.len() != expected {
            return Err(Error::GraphError(format!(
                "phi in {block} needs {expected} operands, got {}",
                operands.len()
            )));
        }
        let id = self.create(block, MirOp::Phi, operands)?;
        let phis = &mut self.block_mut(block).phis;
        phis.try_reserve(1)?;
        phis.push(id);
        Ok(id)
    }

    fn create(&mut self, block: BlockId, op: MirOp, operands: &[ValueId]) -> Result<ValueId> {
        if let Some(dead) = operands.iter().find(|&&o| !self.contains_value(o)) {
            return Err(Error::GraphError(format!(
                "operand {dead} of new {} is not live",
                op.mnemonic()
            )));
        }
        let ty = match op {
            MirOp::TypeGuard { .. } => operands.first().map_or(MirType::Value, |&o| self[o].ty),
            MirOp::Arith {
                specialization: MirType::None,
                ..
            } => MirType::Value,
            _ => op.natural_type(),
        };

        self.values.try_reserve(1)?;
        let id = ValueId::new(self.values.len());
        let mut value = MirValue::new(id, block, op, ty);
        value.operands.try_reserve(operands.len())?;
        value.operands.extend_from_slice(operands);
        self.values.push(Some(value));

        for (index, &operand) in operands.iter().enumerate() {
            self.link_use(operand, UseSite::Value { consumer: id, index })?;
        }
        Ok(id)
    }

    /// Overrides the type of a definition.
    pub fn set_type(&mut self, id: ValueId, ty: MirType) {
        self.value_mut(id).ty = ty;
    }

    /// Replaces the operation of a definition, keeping operands and uses.
    pub(crate) fn set_op(&mut self, id: ValueId, op: MirOp) {
        self.value_mut(id).op = op;
    }

    /// Sets or clears a flag on a definition.
    pub fn set_flag(&mut self, id: ValueId, flag: crate::mir::DefFlags, value: bool) {
        self.value_mut(id).set_flag(flag, value);
    }

    /// Points operand `index` of `consumer` at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the slot does not exist, or
    /// [`Error::OutOfMemory`].
    pub fn set_operand(&mut self, consumer: ValueId, index: usize, value: ValueId) -> Result<()> {
        let Some(old) = self[consumer].operand(index) else {
            return Err(Error::GraphError(format!(
                "{consumer} has no operand {index}"
            )));
        };
        if old == value {
            return Ok(());
        }
        let site = UseSite::Value { consumer, index };
        self.link_use(value, site)?;
        self.unlink_use(old, site);
        self.value_mut(consumer).operands[index] = value;
        Ok(())
    }

    /// Moves every use of `old` to `new`.
    ///
    /// Snapshot captures move as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the use list of `new` cannot grow.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let moved = self[old].uses.len();
        self.value_mut(new).uses.try_reserve(moved)?;
        let uses = std::mem::take(&mut self.value_mut(old).uses);
        for site in uses {
            match site {
                UseSite::Value { consumer, index } => {
                    self.value_mut(consumer).operands[index] = new;
                }
                UseSite::Snapshot { snapshot, index } => {
                    self.snapshot_mut(snapshot).operands[index].value = new;
                }
            }
            self.value_mut(new).uses.push(site);
        }
        Ok(())
    }

    /// Removes a definition from its block and from the use lists of its
    /// operands, and drops the snapshot attached after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the definition is not live or still
    /// has uses.
    pub fn discard(&mut self, id: ValueId) -> Result<()> {
        let Some(value) = self.try_value(id) else {
            return Err(Error::GraphError(format!("{id} was already discarded")));
        };
        if !value.uses.is_empty() {
            return Err(Error::GraphError(format!(
                "{id} still has {} uses",
                value.uses.len()
            )));
        }
        let block = value.block;
        let is_phi = value.is_phi();
        if let Some(snapshot) = value.snapshot {
            self.discard_snapshot(snapshot);
        }

        let owner = self.block_mut(block);
        let list = if is_phi {
            &mut owner.phis
        } else {
            &mut owner.instructions
        };
        list.retain(|&v| v != id);

        let operands = std::mem::take(&mut self.value_mut(id).operands);
        for (index, operand) in operands.into_iter().enumerate() {
            self.unlink_use(operand, UseSite::Value { consumer: id, index });
        }
        self.values[id.index()] = None;
        Ok(())
    }

    /// Returns the position of an instruction within its block.
    #[must_use]
    pub fn position_in_block(&self, id: ValueId) -> Option<usize> {
        let value = self.try_value(id)?;
        self[value.block].instructions.iter().position(|&v| v == id)
    }

    /// Returns the block's optimized-out placeholder, creating it at the
    /// block start on first request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the constant cannot be allocated.
    pub fn optimized_out(&mut self, block: BlockId) -> Result<ValueId> {
        let existing = self[block]
            .instructions
            .iter()
            .copied()
            .find(|&v| self[v].op.is_optimized_out());
        match existing {
            Some(constant) => Ok(constant),
            None => self.insert_at_start(block, MirOp::Constant(ConstValue::OptimizedOut), &[]),
        }
    }

    fn link_use(&mut self, def: ValueId, site: UseSite) -> Result<()> {
        let uses = &mut self.value_mut(def).uses;
        uses.try_reserve(1)?;
        uses.push(site);
        Ok(())
    }

    fn unlink_use(&mut self, def: ValueId, site: UseSite) {
        let uses = &mut self.value_mut(def).uses;
        if let Some(position) = uses.iter().position(|&s| s == site) {
            uses.swap_remove(position);
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Attaches a snapshot to `block`, either at its entry or after one of
    /// its instructions. A previous snapshot at the same anchor is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if a captured value is not live or the
    /// anchor instruction is in another block, or [`Error::OutOfMemory`].
    pub fn add_snapshot(
        &mut self,
        block: BlockId,
        anchor: SnapshotAnchor,
        operands: &[SnapshotOperand],
    ) -> Result<SnapshotId> {
        if let Some(dead) = operands.iter().find(|o| !self.contains_value(o.value)) {
            return Err(Error::GraphError(format!(
                "snapshot operand {} is not live",
                dead.value
            )));
        }
        let previous = match anchor {
            SnapshotAnchor::Entry => self[block].entry_snapshot,
            SnapshotAnchor::After(owner) => {
                if self[owner].block != block {
                    return Err(Error::GraphError(format!(
                        "snapshot anchor {owner} is not in {block}"
                    )));
                }
                self[owner].snapshot
            }
        };
        if let Some(previous) = previous {
            self.discard_snapshot(previous);
        }

        self.snapshots.try_reserve(1)?;
        let id = SnapshotId::new(self.snapshots.len());
        let mut captured = Vec::new();
        captured.try_reserve(operands.len())?;
        captured.extend_from_slice(operands);
        self.snapshots.push(Some(Snapshot {
            id,
            block,
            anchor,
            operands: captured,
        }));
        for (index, operand) in operands.iter().enumerate() {
            self.link_use(operand.value, UseSite::Snapshot { snapshot: id, index })?;
        }
        match anchor {
            SnapshotAnchor::Entry => self.block_mut(block).entry_snapshot = Some(id),
            SnapshotAnchor::After(owner) => self.value_mut(owner).snapshot = Some(id),
        }
        Ok(id)
    }

    /// Points slot `index` of `snapshot` at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the slot does not exist, or
    /// [`Error::OutOfMemory`].
    pub fn set_snapshot_operand(
        &mut self,
        snapshot: SnapshotId,
        index: usize,
        value: ValueId,
    ) -> Result<()> {
        let Some(old) = self[snapshot].operands.get(index).map(|o| o.value) else {
            return Err(Error::GraphError(format!(
                "{snapshot} has no operand {index}"
            )));
        };
        if old == value {
            return Ok(());
        }
        let site = UseSite::Snapshot { snapshot, index };
        self.link_use(value, site)?;
        self.unlink_use(old, site);
        self.snapshot_mut(snapshot).operands[index].value = value;
        Ok(())
    }

    /// Unlinks and drops a snapshot.
    pub fn discard_snapshot(&mut self, id: SnapshotId) {
        let Some(snapshot) = self.snapshots.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for (index, operand) in snapshot.operands.iter().enumerate() {
            self.unlink_use(operand.value, UseSite::Snapshot { snapshot: id, index });
        }
        match snapshot.anchor {
            SnapshotAnchor::Entry => {
                if let Some(block) = self.blocks.get_mut(snapshot.block.index()).and_then(Option::as_mut) {
                    block.entry_snapshot = None;
                }
            }
            SnapshotAnchor::After(owner) => {
                if let Some(value) = self.values.get_mut(owner.index()).and_then(Option::as_mut) {
                    value.snapshot = None;
                }
            }
        }
    }

    // ── Dominance ───────────────────────────────────────────────────────

    /// Returns `true` if `a` dominates `b` (every block dominates itself).
    ///
    /// Answered in constant time by interval containment over the dominator
    /// tree pre-order; only meaningful while
    /// [`GraphProperties::DOMINATOR_TREE`] holds.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let a = &self[a];
        let b = &self[b];
        b.dom_index >= a.dom_index && b.dom_index < a.dom_index + a.num_dominated
    }

    /// If `block` is entered only through a conditional branch of its
    /// immediate dominator, returns that `Test` and whether `block` is the
    /// taken side.
    #[must_use]
    pub fn immediate_dominator_branch(&self, block: BlockId) -> Option<(ValueId, bool)> {
        let data = &self[block];
        let [pred] = data.predecessors[..] else {
            return None;
        };
        if data.idom != Some(pred) {
            return None;
        }
        let dominator = &self[pred];
        let test = dominator.last_instruction()?;
        if !matches!(self[test].op, MirOp::Test) {
            return None;
        }
        let [if_true, if_false] = dominator.successors[..] else {
            return None;
        };
        if if_true == if_false {
            return None;
        }
        Some((test, if_true == block))
    }

    pub(crate) fn clear_dominator_tree(&mut self) {
        for block in self.blocks.iter_mut().flatten() {
            block.idom = None;
            block.dominated.clear();
            block.num_dominated = 0;
            block.dom_index = 0;
        }
        self.properties.remove(GraphProperties::DOMINATOR_TREE);
    }
}

impl Index<BlockId> for MirGraph {
    type Output = MirBlock;

    fn index(&self, id: BlockId) -> &MirBlock {
        match self.try_block(id) {
            Some(block) => block,
            None => panic!("{id} is not a live block"),
        }
    }
}

impl Index<ValueId> for MirGraph {
    type Output = MirValue;

    fn index(&self, id: ValueId) -> &MirValue {
        match self.try_value(id) {
            Some(value) => value,
            None => panic!("{id} is not a live value"),
        }
    }
}

impl Index<SnapshotId> for MirGraph {
    type Output = Snapshot;

    fn index(&self, id: SnapshotId) -> &Snapshot {
        match self.try_snapshot(id) {
            Some(snapshot) => snapshot,
            None => panic!("{id} is not a live snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::ArithOp;

    fn int(graph: &mut MirGraph, block: BlockId, v: i32) -> ValueId {
        graph
            .append(block, MirOp::Constant(ConstValue::Int32(v)), &[])
            .unwrap()
    }

    fn add(graph: &mut MirGraph, block: BlockId, lhs: ValueId, rhs: ValueId) -> ValueId {
        let op = MirOp::Arith {
            op: ArithOp::Add,
            specialization: MirType::Int32,
        };
        graph.append(block, op, &[lhs, rhs]).unwrap()
    }

    #[test]
    fn test_operands_link_uses() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let sum = add(&mut graph, entry, a, a);

        assert_eq!(
            graph[a].uses(),
            &[
                UseSite::Value { consumer: sum, index: 0 },
                UseSite::Value { consumer: sum, index: 1 }
            ]
        );
        assert_eq!(graph[sum].ty(), MirType::Int32);
    }

    #[test]
    fn test_replace_all_uses_moves_snapshot_captures() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let b = int(&mut graph, entry, 2);
        let sum = add(&mut graph, entry, a, a);
        let rp = graph
            .add_snapshot(
                entry,
                SnapshotAnchor::After(sum),
                &[SnapshotOperand { value: a, observable: true }],
            )
            .unwrap();

        graph.replace_all_uses_with(a, b).unwrap();
        assert!(!graph[a].has_uses());
        assert_eq!(graph[b].uses().len(), 3);
        assert_eq!(graph[sum].operands(), &[b, b]);
        assert_eq!(graph[rp].operands()[0].value, b);
    }

    #[test]
    fn test_discard_unlinks_operands_and_snapshot() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let sum = add(&mut graph, entry, a, a);
        let rp = graph
            .add_snapshot(
                entry,
                SnapshotAnchor::After(sum),
                &[SnapshotOperand { value: a, observable: false }],
            )
            .unwrap();

        graph.discard(sum).unwrap();
        assert!(!graph.contains_value(sum));
        assert!(graph.try_snapshot(rp).is_none());
        assert!(!graph[a].has_uses());
        assert_eq!(graph[entry].instructions(), &[a]);
    }

    #[test]
    fn test_discard_refuses_used_values() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        add(&mut graph, entry, a, a);
        assert!(matches!(graph.discard(a), Err(Error::GraphError(_))));
        assert!(graph.discard(ValueId::new(99)).is_err());
    }

    #[test]
    fn test_set_operand_moves_single_edge() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let b = int(&mut graph, entry, 2);
        let sum = add(&mut graph, entry, a, a);

        graph.set_operand(sum, 1, b).unwrap();
        assert_eq!(graph[sum].operands(), &[a, b]);
        assert_eq!(graph[a].uses().len(), 1);
        assert_eq!(graph[b].uses(), &[UseSite::Value { consumer: sum, index: 1 }]);
        assert!(graph.set_operand(sum, 5, b).is_err());
    }

    #[test]
    fn test_phi_operand_count_checked() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let join = graph.add_block().unwrap();
        graph.add_edge(entry, join).unwrap();
        let a = int(&mut graph, entry, 1);
        assert!(graph.add_phi(join, &[a, a]).is_err());
        let phi = graph.add_phi(join, &[a]).unwrap();
        assert_eq!(graph[join].phis(), &[phi]);
        assert_eq!(graph[phi].ty(), MirType::None);
    }

    #[test]
    fn test_insert_positions() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let ret = graph.append(entry, MirOp::Return, &[a]).unwrap();
        let before_ret = graph.insert_before_terminator(entry, MirOp::Box, &[a]).unwrap();
        let first = graph.insert_at_start(entry, MirOp::Box, &[a]).unwrap();
        let before_a = graph.insert_before(a, MirOp::Box, &[first]).unwrap();

        assert_eq!(
            graph[entry].instructions(),
            &[first, before_a, a, before_ret, ret]
        );
        assert_eq!(graph.position_in_block(ret), Some(4));
    }

    #[test]
    fn test_optimized_out_is_shared_per_block() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let first = graph.optimized_out(entry).unwrap();
        let second = graph.optimized_out(entry).unwrap();
        assert_eq!(first, second);
        assert_eq!(graph[first].ty(), MirType::OptimizedOut);
    }

    #[test]
    fn test_split_edge_keeps_predecessor_slot() {
        //   entry
        //   /   \
        //  a     |
        //   \   /
        //    join
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = graph.add_block().unwrap();
        let join = graph.add_block().unwrap();
        graph.add_edge(entry, a).unwrap();
        graph.add_edge(entry, join).unwrap();
        graph.add_edge(a, join).unwrap();

        let split = graph.split_edge(entry, 1).unwrap();
        assert_eq!(graph[entry].successors(), &[a, split]);
        assert_eq!(graph[join].predecessors(), &[split, a]);
        assert_eq!(graph[split].kind(), BlockKind::SplitEdge);
        assert_eq!(graph.block_order(), &[entry, split, a, join]);
        let goto = graph[split].last_instruction().unwrap();
        assert_eq!(graph[goto].op(), &MirOp::Goto);
    }

    #[test]
    fn test_split_backedge_becomes_backedge() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let header = graph.add_block().unwrap();
        let exit = graph.add_block().unwrap();
        graph.add_edge(entry, header).unwrap();
        graph.add_edge(header, header).unwrap();
        graph.add_edge(header, exit).unwrap();
        graph.set_loop_header(header, header);
        graph.set_loop_depth(header, 1);

        let split = graph.split_edge(header, 0).unwrap();
        assert_eq!(graph[header].backedge(), Some(split));
        assert_eq!(graph[split].loop_depth(), 1);
        assert_eq!(graph[header].predecessors(), &[entry, split]);
    }

    #[test]
    fn test_snapshot_replaces_previous_at_same_anchor() {
        let mut graph = MirGraph::new("t");
        let entry = graph.entry();
        let a = int(&mut graph, entry, 1);
        let first = graph
            .add_snapshot(entry, SnapshotAnchor::Entry, &[SnapshotOperand { value: a, observable: true }])
            .unwrap();
        let second = graph.add_snapshot(entry, SnapshotAnchor::Entry, &[]).unwrap();
        assert!(graph.try_snapshot(first).is_none());
        assert_eq!(graph[entry].entry_snapshot(), Some(second));
        assert!(!graph[a].has_uses());
    }
}
