//! Textual dump of a graph, used by trace logging and test failure output.
//!
//! ```text
//! graph f
//! block0 #0 preds=[] succs=[block1, block2] idom=block0
//!   v0 = parameter(0) : value
//!   v1 = test v0
//! block3 #3 preds=[block1, block2] succs=[] idom=block0
//!   v4 = phi v2, v3 : int32
//!   v5 = add(int32) v4, v4 : int32
//!   v6 = return v5
//!   rp0 after v5 [v4, ~v5]
//! ```
//!
//! Snapshot slots prefixed with `~` are not observable.

use std::fmt;

use crate::mir::{ConstValue, MirGraph, MirOp, MirType, Snapshot, ValueId};

impl fmt::Display for MirGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph {}", self.name())?;
        if let Some(osr) = self.osr_block() {
            write!(f, " osr={osr}")?;
        }
        writeln!(f)?;

        for block in self.blocks() {
            write!(
                f,
                "{} #{} preds={:?} succs={:?}",
                block.id(),
                block.number(),
                block.predecessors(),
                block.successors()
            )?;
            if let Some(idom) = block.immediate_dominator() {
                write!(f, " idom={idom}")?;
            }
            if let Some(backedge) = block.backedge() {
                write!(f, " loop(backedge={backedge}, depth={})", block.loop_depth())?;
            }
            writeln!(f)?;

            if let Some(snapshot) = block.entry_snapshot() {
                write_snapshot(f, &self[snapshot])?;
            }
            for &id in block.phis().iter().chain(block.instructions()) {
                write_value(f, self, id)?;
                if let Some(snapshot) = self[id].snapshot() {
                    write_snapshot(f, &self[snapshot])?;
                }
            }
        }
        Ok(())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, graph: &MirGraph, id: ValueId) -> fmt::Result {
    let value = &graph[id];
    write!(f, "  {id} = {}", value.op().mnemonic())?;
    match value.op() {
        MirOp::Parameter(index) => write!(f, "({index})")?,
        MirOp::Constant(constant) => match constant {
            ConstValue::Int32(v) => write!(f, " {v}")?,
            ConstValue::Double(v) => write!(f, " {v:?}")?,
            ConstValue::Boolean(v) => write!(f, " {v}")?,
            ConstValue::Undefined => write!(f, " undefined")?,
            ConstValue::Null => write!(f, " null")?,
            ConstValue::OptimizedOut => write!(f, " optimized-out")?,
        },
        MirOp::Arith { specialization, .. } => write!(f, "({specialization})")?,
        MirOp::Compare { op, operand_type } => write!(f, "({op} {operand_type})")?,
        MirOp::Unbox { target, mode } => write!(f, "({target}, {mode})")?,
        MirOp::BoundsCheck { minimum, maximum } => write!(f, "[{minimum}..{maximum}]")?,
        MirOp::TypeGuard { filters } => write!(f, "({filters:?})")?,
        _ => {}
    }

    let operands = value.operands();
    if !operands.is_empty() {
        write!(f, " ")?;
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
    }
    if value.ty() != MirType::None {
        write!(f, " : {}", value.ty())?;
    }
    if !value.flags().is_empty() {
        write!(f, " {:?}", value.flags())?;
    }
    writeln!(f)
}

fn write_snapshot(f: &mut fmt::Formatter<'_>, snapshot: &Snapshot) -> fmt::Result {
    match snapshot.owner() {
        Some(owner) => write!(f, "  {} after {owner} [", snapshot.id())?,
        None => write!(f, "  {} at entry [", snapshot.id())?,
    }
    for (i, operand) in snapshot.operands().iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if !operand.observable {
            write!(f, "~")?;
        }
        write!(f, "{}", operand.value)?;
    }
    writeln!(f, "]")
}
