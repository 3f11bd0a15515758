//! Deopt snapshot pruning.
//!
//! A snapshot keeps every value it captures alive until the snapshot's
//! program point, which stretches live ranges well past the last real use.
//! When all real uses of an instruction sit in its own block, any later
//! snapshot in that block cannot need the value: a bailout there resumes
//! after the value's consumers already ran. Such captures are replaced by
//! the block's optimized-out constant.
//!
//! An instruction is left alone if
//!
//! - it is a constant, an unbox or a parameter, which are cheap to keep
//! - it is recovered on bailout or implicitly used
//! - a phi, a box or an instruction in another block uses it
//! - an observable snapshot slot captures it
//!
//! Graphs with exception handlers are skipped entirely, as are blocks that
//! are their own back edge.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    compiler::{CompileContext, EventKind, MirPass},
    mir::{BlockId, DefFlags, MirGraph, MirOp, SnapshotId, UseSite, ValueId},
    Result,
};

/// Replaces snapshot captures past a value's last real use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotPrunePass;

impl SnapshotPrunePass {
    /// Prunes every block of `graph` and returns the number of snapshot
    /// slots replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn prune_snapshots(graph: &mut MirGraph, ctx: &CompileContext) -> Result<usize> {
        if graph.has_try_block() {
            debug!(unit = graph.name(), "snapshot pruning skipped for try blocks");
            return Ok(0);
        }

        let mut pruned = 0;
        for block in graph.reverse_postorder() {
            ctx.check_cancelled("snapshots")?;
            if graph[block].backedge() == Some(block) {
                continue;
            }
            pruned += Self::prune_block(graph, ctx, block)?;
        }
        Ok(pruned)
    }

    fn prune_block(graph: &mut MirGraph, ctx: &CompileContext, block: BlockId) -> Result<usize> {
        let instructions = graph[block].instructions().to_vec();
        let positions: HashMap<ValueId, usize> = instructions
            .iter()
            .enumerate()
            .map(|(position, &ins)| (ins, position))
            .collect();

        let mut sites: Vec<(ValueId, SnapshotId, usize)> = Vec::new();
        for &ins in &instructions {
            let Some(last_use) = Self::last_use_position(graph, block, ins, &positions) else {
                continue;
            };
            for site in graph[ins].uses() {
                let UseSite::Snapshot { snapshot, index } = *site else {
                    continue;
                };
                let Some(owner) = graph[snapshot].owner() else {
                    continue;
                };
                if graph[snapshot].block() != block || owner == ins {
                    continue;
                }
                if positions.get(&owner).is_some_and(|&position| position > last_use) {
                    sites.try_reserve(1)?;
                    sites.push((ins, snapshot, index));
                }
            }
        }

        if sites.is_empty() {
            return Ok(0);
        }
        let placeholder = graph.optimized_out(block)?;
        for &(ins, snapshot, index) in &sites {
            graph.set_snapshot_operand(snapshot, index, placeholder)?;
            ctx.events
                .record(EventKind::SnapshotOperandPruned)
                .unit(graph.name())
                .block(block)
                .value(ins)
                .message(format!("{ins} dropped from {snapshot} slot {index}"));
        }
        Ok(sites.len())
    }

    /// Returns the position of the last real use of `ins`, or `None` if the
    /// instruction is excluded or used where pruning would be unsound.
    fn last_use_position(
        graph: &MirGraph,
        block: BlockId,
        ins: ValueId,
        positions: &HashMap<ValueId, usize>,
    ) -> Option<usize> {
        let value = &graph[ins];
        if matches!(
            value.op(),
            MirOp::Constant(_) | MirOp::Unbox { .. } | MirOp::Parameter(_)
        ) || value.has(DefFlags::RECOVERED_ON_BAILOUT)
            || value.has(DefFlags::IMPLICITLY_USED)
        {
            return None;
        }

        let mut last = *positions.get(&ins)?;
        for site in value.uses() {
            match *site {
                UseSite::Value { consumer, .. } => {
                    let user = &graph[consumer];
                    if user.block() != block || user.is_phi() || matches!(user.op(), MirOp::Box) {
                        return None;
                    }
                    last = last.max(*positions.get(&consumer)?);
                }
                UseSite::Snapshot { snapshot, index } => {
                    if graph[snapshot].operands()[index].observable {
                        return None;
                    }
                }
            }
        }
        Some(last)
    }
}

impl MirPass for SnapshotPrunePass {
    fn name(&self) -> &'static str {
        "snapshots"
    }

    fn description(&self) -> &'static str {
        "Snapshot operand pruning past last use"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let pruned = Self::prune_snapshots(graph, ctx)?;
        debug!(unit = graph.name(), pruned, "snapshots pruned");
        Ok(pruned > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MirBuilder, MirType, UnboxMode};

    struct Straight {
        builder: MirBuilder,
        sum: ValueId,
        last_use: ValueId,
    }

    /// `sum = n + 1; twice = sum + sum; call(...)`, all in the entry block.
    fn straight_line() -> Straight {
        let mut b = MirBuilder::new("straight");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let sum = b.add(entry, MirType::Int32, n, one).unwrap();
        let last_use = b.add(entry, MirType::Int32, sum, sum).unwrap();
        Straight {
            builder: b,
            sum,
            last_use,
        }
    }

    #[test]
    fn test_capture_after_last_use_pruned() {
        let Straight {
            mut builder,
            sum,
            last_use,
        } = straight_line();
        let entry = builder.entry();
        let p = builder.graph()[entry].instructions()[0];
        let call = builder.call(entry, p, &[]).unwrap();
        let snapshot = builder.resume_after(call, &[(sum, false), (last_use, true)]).unwrap();
        builder.ret(entry, last_use).unwrap();
        let mut graph = builder.finish();

        let context = CompileContext::default();
        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &context).unwrap(), 1);
        let slot = graph[snapshot].operands()[0].value;
        assert!(graph[slot].op().is_optimized_out());
        assert_eq!(graph[slot].block(), entry);
        assert_eq!(graph[snapshot].operands()[1].value, last_use);
        assert!(context.events.has(EventKind::SnapshotOperandPruned));
    }

    #[test]
    fn test_capture_before_last_use_kept() {
        let mut b = MirBuilder::new("early");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let sum = b.add(entry, MirType::Int32, n, one).unwrap();
        let own = b.resume_after(sum, &[(sum, false)]).unwrap();
        let call = b.call(entry, p, &[]).unwrap();
        let snapshot = b.resume_after(call, &[(sum, false)]).unwrap();
        let twice = b.add(entry, MirType::Int32, sum, sum).unwrap();
        b.ret(entry, twice).unwrap();
        let mut graph = b.finish();

        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &CompileContext::default()).unwrap(), 0);
        assert_eq!(graph[snapshot].operands()[0].value, sum);
        assert_eq!(graph[own].operands()[0].value, sum);
    }

    #[test]
    fn test_observable_capture_kept() {
        let Straight {
            mut builder,
            sum,
            last_use,
        } = straight_line();
        let entry = builder.entry();
        let p = builder.graph()[entry].instructions()[0];
        let call = builder.call(entry, p, &[]).unwrap();
        let snapshot = builder.resume_after(call, &[(sum, true)]).unwrap();
        builder.ret(entry, last_use).unwrap();
        let mut graph = builder.finish();

        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &CompileContext::default()).unwrap(), 0);
        assert_eq!(graph[snapshot].operands()[0].value, sum);
    }

    #[test]
    fn test_boxed_or_remote_use_kept() {
        let mut b = MirBuilder::new("remote");
        let entry = b.entry();
        let next = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let sum = b.add(entry, MirType::Int32, n, n).unwrap();
        let boxed_src = b.add(entry, MirType::Int32, n, n).unwrap();
        let boxed = b.box_value(entry, boxed_src).unwrap();
        let call = b.call(entry, boxed, &[]).unwrap();
        let snapshot = b.resume_after(call, &[(sum, false), (boxed_src, false)]).unwrap();
        b.goto(entry, next).unwrap();
        b.ret(next, sum).unwrap();
        let mut graph = b.finish();

        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &CompileContext::default()).unwrap(), 0);
        assert_eq!(graph[snapshot].operands()[0].value, sum);
        assert_eq!(graph[snapshot].operands()[1].value, boxed_src);
    }

    #[test]
    fn test_try_block_skipped() {
        let Straight {
            mut builder,
            sum,
            last_use,
        } = straight_line();
        let entry = builder.entry();
        let p = builder.graph()[entry].instructions()[0];
        let call = builder.call(entry, p, &[]).unwrap();
        builder.resume_after(call, &[(sum, false)]).unwrap();
        builder.ret(entry, last_use).unwrap();
        let mut graph = builder.finish();
        graph.set_has_try_block(true);

        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &CompileContext::default()).unwrap(), 0);
    }

    #[test]
    fn test_self_loop_header_skipped() {
        let mut b = MirBuilder::new("spin");
        let entry = b.entry();
        let header = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        b.goto(entry, header).unwrap();
        b.edge(header, header).unwrap();
        let n = b.unbox(header, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let sum = b.add(header, MirType::Int32, n, n).unwrap();
        let twice = b.add(header, MirType::Int32, sum, sum).unwrap();
        let call = b.call(header, p, &[]).unwrap();
        let snapshot = b.resume_after(call, &[(sum, false), (twice, false)]).unwrap();
        b.goto(header, header).unwrap();
        b.loop_blocks(header, header, &[], 1);
        let mut graph = b.finish();

        assert_eq!(SnapshotPrunePass::prune_snapshots(&mut graph, &CompileContext::default()).unwrap(), 0);
        assert_eq!(graph[snapshot].operands()[0].value, sum);
    }
}
