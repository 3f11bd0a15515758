//! Convenience construction of IR graphs.
//!
//! The bytecode frontend is not part of this crate; [`MirBuilder`] stands in
//! for it in tests, benchmarks and embedders that produce IR by other means.
//! It is a thin layer over the [`MirGraph`] mutation API that spells out
//! operand layouts and wires CFG edges for control instructions.
//!
//! Edges of a control instruction are added when it is appended unless they
//! were declared up front with [`MirBuilder::edge`]. Declaring a loop's back
//! edge early lets the header's phis be built before the loop body.
//!
//! # Examples
//!
//! ```rust
//! use mirflow::{MirBuilder, mir::MirType};
//!
//! // function f(a) { var x = a ? 1 : 2; return x + x; }
//! let mut b = MirBuilder::new("f");
//! let entry = b.entry();
//! let then_block = b.block()?;
//! let else_block = b.block()?;
//! let join = b.block()?;
//!
//! let a = b.parameter(entry, 0)?;
//! b.test(entry, a, then_block, else_block)?;
//! let one = b.int32(then_block, 1)?;
//! b.goto(then_block, join)?;
//! let two = b.int32(else_block, 2)?;
//! b.goto(else_block, join)?;
//! let x = b.phi(join, &[one, two])?;
//! let sum = b.add(join, MirType::Int32, x, x)?;
//! b.ret(join, sum)?;
//!
//! let graph = b.finish();
//! assert_eq!(graph.block_count(), 4);
//! # Ok::<(), mirflow::Error>(())
//! ```

use crate::{
    mir::{
        ArithOp, BlockId, CompareOp, ConstValue, GuardFilter, MirGraph, MirOp, MirType,
        SnapshotAnchor, SnapshotId, SnapshotOperand, UnboxMode, ValueId,
    },
    Error, Result,
};

/// Builds a [`MirGraph`] block by block.
#[derive(Debug, Clone)]
pub struct MirBuilder {
    graph: MirGraph,
}

impl MirBuilder {
    /// Starts a graph with an empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        MirBuilder {
            graph: MirGraph::new(name),
        }
    }

    /// Returns the entry block.
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        self.graph.entry()
    }

    /// Returns the graph built so far.
    #[must_use]
    pub const fn graph(&self) -> &MirGraph {
        &self.graph
    }

    /// Returns the graph built so far for direct mutation.
    pub fn graph_mut(&mut self) -> &mut MirGraph {
        &mut self.graph
    }

    /// Finishes construction.
    #[must_use]
    pub fn finish(self) -> MirGraph {
        self.graph
    }

    /// Adds an empty block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the arena cannot grow.
    pub fn block(&mut self) -> Result<BlockId> {
        self.graph.add_block()
    }

    /// Declares a CFG edge ahead of the control instruction that takes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if an edge list cannot grow.
    pub fn edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        self.graph.add_edge(from, to)
    }

    /// Marks `header` as a loop header closed by `backedge` and sets the
    /// loop depth of every block in `body` (header included) to `depth`.
    pub fn loop_blocks(&mut self, header: BlockId, backedge: BlockId, body: &[BlockId], depth: u32) {
        self.graph.set_loop_header(header, backedge);
        self.graph.set_loop_depth(header, depth);
        for &block in body {
            self.graph.set_loop_depth(block, depth);
        }
    }

    /// Declares `block` as the on-stack-replacement entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block has predecessors.
    pub fn osr_entry(&mut self, block: BlockId) -> Result<()> {
        self.graph.set_osr_block(block)
    }

    // ── Values ──────────────────────────────────────────────────────────

    /// Appends an arbitrary operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn op(&mut self, block: BlockId, op: MirOp, operands: &[ValueId]) -> Result<ValueId> {
        self.graph.append(block, op, operands)
    }

    /// Appends an incoming argument.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn parameter(&mut self, block: BlockId, index: u32) -> Result<ValueId> {
        self.op(block, MirOp::Parameter(index), &[])
    }

    /// Appends a constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn constant(&mut self, block: BlockId, value: ConstValue) -> Result<ValueId> {
        self.op(block, MirOp::Constant(value), &[])
    }

    /// Appends an int32 constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn int32(&mut self, block: BlockId, value: i32) -> Result<ValueId> {
        self.constant(block, ConstValue::Int32(value))
    }

    /// Appends a double constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn double(&mut self, block: BlockId, value: f64) -> Result<ValueId> {
        self.constant(block, ConstValue::Double(value))
    }

    /// Appends `undefined`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn undefined(&mut self, block: BlockId) -> Result<ValueId> {
        self.constant(block, ConstValue::Undefined)
    }

    /// Appends `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`].
    pub fn null(&mut self, block: BlockId) -> Result<ValueId> {
        self.constant(block, ConstValue::Null)
    }

    /// Appends binary arithmetic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn arith(
        &mut self,
        block: BlockId,
        op: ArithOp,
        specialization: MirType,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        self.op(block, MirOp::Arith { op, specialization }, &[lhs, rhs])
    }

    /// Appends an addition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn add(&mut self, block: BlockId, specialization: MirType, lhs: ValueId, rhs: ValueId) -> Result<ValueId> {
        self.arith(block, ArithOp::Add, specialization, lhs, rhs)
    }

    /// Appends a comparison.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn compare(
        &mut self,
        block: BlockId,
        op: CompareOp,
        operand_type: MirType,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        self.op(block, MirOp::Compare { op, operand_type }, &[lhs, rhs])
    }

    /// Appends a logical not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn not(&mut self, block: BlockId, input: ValueId) -> Result<ValueId> {
        self.op(block, MirOp::Not, &[input])
    }

    /// Appends a box.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn box_value(&mut self, block: BlockId, input: ValueId) -> Result<ValueId> {
        self.op(block, MirOp::Box, &[input])
    }

    /// Appends an unbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn unbox(&mut self, block: BlockId, input: ValueId, target: MirType, mode: UnboxMode) -> Result<ValueId> {
        self.op(block, MirOp::Unbox { target, mode }, &[input])
    }

    /// Appends a float32 conversion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn to_float32(&mut self, block: BlockId, input: ValueId) -> Result<ValueId> {
        self.op(block, MirOp::ToFloat32, &[input])
    }

    /// Appends an array length read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn array_length(&mut self, block: BlockId, array: ValueId) -> Result<ValueId> {
        self.op(block, MirOp::ArrayLength, &[array])
    }

    /// Appends an element load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn load_element(&mut self, block: BlockId, array: ValueId, index: ValueId, elem_type: MirType) -> Result<ValueId> {
        self.op(block, MirOp::LoadElement { elem_type }, &[array, index])
    }

    /// Appends an element store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn store_element(
        &mut self,
        block: BlockId,
        array: ValueId,
        index: ValueId,
        value: ValueId,
        elem_type: MirType,
    ) -> Result<ValueId> {
        self.op(block, MirOp::StoreElement { elem_type }, &[array, index, value])
    }

    /// Appends a bounds check covering offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn bounds_check(&mut self, block: BlockId, index: ValueId, length: ValueId) -> Result<ValueId> {
        let op = MirOp::BoundsCheck {
            minimum: 0,
            maximum: 0,
        };
        self.op(block, op, &[index, length])
    }

    /// Appends a type guard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn type_guard(&mut self, block: BlockId, input: ValueId, filters: GuardFilter) -> Result<ValueId> {
        self.op(block, MirOp::TypeGuard { filters }, &[input])
    }

    /// Appends an opaque call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn call(&mut self, block: BlockId, callee: ValueId, args: &[ValueId]) -> Result<ValueId> {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        self.op(block, MirOp::Call, &operands)
    }

    /// Adds a phi with one operand per predecessor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] on an operand count mismatch.
    pub fn phi(&mut self, block: BlockId, operands: &[ValueId]) -> Result<ValueId> {
        self.graph.add_phi(block, operands)
    }

    /// Rewires operand `index` of a phi, e.g. to close a loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the slot does not exist.
    pub fn set_phi_operand(&mut self, phi: ValueId, index: usize, value: ValueId) -> Result<()> {
        self.graph.set_operand(phi, index, value)
    }

    // ── Control ─────────────────────────────────────────────────────────

    /// Ends `block` with an unconditional branch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block already has other successors.
    pub fn goto(&mut self, block: BlockId, target: BlockId) -> Result<ValueId> {
        let successors = self.graph[block].successors().to_vec();
        match successors[..] {
            [] => self.graph.add_edge(block, target)?,
            [declared] if declared == target => {}
            _ => {
                return Err(Error::GraphError(format!(
                    "{block} cannot branch to {target}, successors are {successors:?}"
                )))
            }
        }
        self.op(block, MirOp::Goto, &[])
    }

    /// Ends `block` with a conditional branch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the block already has other successors.
    pub fn test(&mut self, block: BlockId, condition: ValueId, if_true: BlockId, if_false: BlockId) -> Result<ValueId> {
        let successors = self.graph[block].successors().to_vec();
        match successors[..] {
            [] => {
                self.graph.add_edge(block, if_true)?;
                self.graph.add_edge(block, if_false)?;
            }
            [t, f] if t == if_true && f == if_false => {}
            _ => {
                return Err(Error::GraphError(format!(
                    "{block} cannot branch to {if_true}/{if_false}, successors are {successors:?}"
                )))
            }
        }
        self.op(block, MirOp::Test, &[condition])
    }

    /// Ends `block` with a return.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for a dead operand, or [`Error::OutOfMemory`].
    pub fn ret(&mut self, block: BlockId, value: ValueId) -> Result<ValueId> {
        self.op(block, MirOp::Return, &[value])
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Attaches a snapshot after `instruction`; each slot is
    /// `(value, observable)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn resume_after(&mut self, instruction: ValueId, slots: &[(ValueId, bool)]) -> Result<SnapshotId> {
        let block = self.graph[instruction].block();
        self.snapshot(block, SnapshotAnchor::After(instruction), slots)
    }

    /// Attaches a snapshot at the entry of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] for dead operands, or [`Error::OutOfMemory`].
    pub fn resume_at_entry(&mut self, block: BlockId, slots: &[(ValueId, bool)]) -> Result<SnapshotId> {
        self.snapshot(block, SnapshotAnchor::Entry, slots)
    }

    fn snapshot(&mut self, block: BlockId, anchor: SnapshotAnchor, slots: &[(ValueId, bool)]) -> Result<SnapshotId> {
        let operands: Vec<SnapshotOperand> = slots
            .iter()
            .map(|&(value, observable)| SnapshotOperand { value, observable })
            .collect();
        self.graph.add_snapshot(block, anchor, &operands)
    }
}
