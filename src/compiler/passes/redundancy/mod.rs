//! Redundancy elimination over the dominator tree.
//!
//! One pre-order walk of the dominator tree visits every block after all
//! of its dominators. The walk index of a block and the size of its
//! dominated subtree give the index range in which a fact established in
//! that block holds, so dominance is checked without touching the tree
//! again.
//!
//! During the walk:
//!
//! - bounds checks fold into an equivalent dominating check (see [`bounds`])
//! - null and undefined guards proven by a dominating branch are dropped
//!   (see [`guards`])
//!
//! A dead-code sweep follows. Pure instructions without uses or attached
//! snapshot are discarded, and their operands re-examined so dead chains
//! disappear in one sweep. Recoverable instructions kept alive only by
//! snapshots are marked [`DefFlags::RECOVERED_ON_BAILOUT`] instead.

mod bounds;
mod guards;

pub use bounds::{equivalent_checks, LinearSum};

use tracing::{debug, trace};

use crate::{
    compiler::{passes::DominatorPass, CompileContext, EventKind, MirPass},
    mir::{BlockId, DefFlags, GraphProperties, MirGraph, MirOp, UseSite, ValueId},
    Result,
};

use bounds::{BoundsCheckTable, Fold};

/// Counters reported by one run of the redundancy eliminator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RedundancyStats {
    /// Bounds checks folded into a dominating check
    pub bounds_checks: usize,
    /// Type guards proven by a dominating branch
    pub type_guards: usize,
    /// Dead instructions discarded
    pub dead: usize,
    /// Instructions newly marked recovered-on-bailout
    pub recovered: usize,
}

impl RedundancyStats {
    /// Returns `true` if the run modified the graph.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.bounds_checks + self.type_guards + self.dead + self.recovered > 0
    }
}

enum Liveness {
    Live,
    Dead,
    Recoverable,
}

/// Removes dominated duplicate checks, proven guards and dead code.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedundancyEliminationPass;

impl RedundancyEliminationPass {
    /// Runs the dominator-tree walk and the dead-code sweep.
    ///
    /// Builds the dominator tree first if the graph does not claim one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn eliminate_redundancy(graph: &mut MirGraph, ctx: &CompileContext) -> Result<RedundancyStats> {
        if !graph.properties().contains(GraphProperties::DOMINATOR_TREE) {
            debug!(unit = graph.name(), "rebuilding dominator tree");
            DominatorPass::build_dominator_tree(graph, ctx)?;
        }

        let mut stats = Self::walk_dominator_tree(graph, ctx)?;
        let (dead, recovered) = Self::eliminate_dead_code(graph, ctx)?;
        stats.dead = dead;
        stats.recovered = recovered;
        Ok(stats)
    }

    fn walk_dominator_tree(graph: &mut MirGraph, ctx: &CompileContext) -> Result<RedundancyStats> {
        let mut stats = RedundancyStats::default();
        let mut table = BoundsCheckTable::new();

        let mut stack: Vec<BlockId> = Vec::new();
        stack.try_reserve(graph.block_count())?;
        let order = graph.block_order().to_vec();
        stack.extend(
            order
                .iter()
                .rev()
                .copied()
                .filter(|&b| graph[b].is_dominator_root()),
        );

        let mut index = 0;
        while let Some(block) = stack.pop() {
            ctx.check_cancelled("redundancy")?;
            let valid_end = index + graph[block].num_dominated();

            for ins in graph[block].instructions().to_vec() {
                if !graph.contains_value(ins) {
                    continue;
                }
                match graph[ins].op() {
                    MirOp::BoundsCheck { .. } => match table.fold(graph, ins, index, valid_end)? {
                        Fold::Recorded => {}
                        Fold::Folded(dominating) => {
                            stats.bounds_checks += 1;
                            ctx.events
                                .record(EventKind::BoundsCheckEliminated)
                                .unit(graph.name())
                                .block(block)
                                .value(ins)
                                .message(format!("{ins} folded into {dominating}"));
                        }
                        Fold::Overflow(dominating) => {
                            ctx.events
                                .record(EventKind::Warning)
                                .unit(graph.name())
                                .block(block)
                                .value(ins)
                                .message(format!("{ins} not folded into {dominating}: offset overflow"));
                        }
                    },
                    MirOp::TypeGuard { .. } => {
                        if guards::eliminate_guard(graph, ins)? {
                            stats.type_guards += 1;
                            ctx.events
                                .record(EventKind::TypeGuardEliminated)
                                .unit(graph.name())
                                .block(block)
                                .value(ins)
                                .message(format!("{ins} proven by a dominating branch"));
                        }
                    }
                    _ => {}
                }
            }

            index += 1;
            stack.try_reserve(graph[block].dominated().len())?;
            stack.extend(graph[block].dominated().iter().rev().copied());
        }
        trace!(unit = graph.name(), visited = index, "dominator walk done");
        Ok(stats)
    }

    fn liveness(graph: &MirGraph, id: ValueId) -> Liveness {
        let value = &graph[id];
        if value.is_phi()
            || matches!(value.op(), MirOp::Parameter(_))
            || !value.is_pure()
            || value.has(DefFlags::IMPLICITLY_USED)
            || value.snapshot().is_some()
        {
            return Liveness::Live;
        }
        if !value.has_uses() {
            return Liveness::Dead;
        }
        // Consumers already rebuilt on bailout keep their inputs only for
        // recovery.
        let snapshot_only = value.uses().iter().all(|site| match *site {
            UseSite::Value { consumer, .. } => graph[consumer].has(DefFlags::RECOVERED_ON_BAILOUT),
            UseSite::Snapshot { .. } => true,
        });
        if snapshot_only
            && value.has(DefFlags::RECOVERABLE)
            && !value.has(DefFlags::RECOVERED_ON_BAILOUT)
        {
            return Liveness::Recoverable;
        }
        Liveness::Live
    }

    /// Sweeps blocks in post-order and instructions backwards, so consumers
    /// are usually visited before the values they use. Sweeps repeat until
    /// nothing more is removed or marked.
    fn eliminate_dead_code(graph: &mut MirGraph, ctx: &CompileContext) -> Result<(usize, usize)> {
        let mut dead = 0;
        let mut recovered = 0;
        loop {
            let (swept_dead, swept_recovered) = Self::sweep(graph, ctx)?;
            if swept_dead == 0 && swept_recovered == 0 {
                break;
            }
            dead += swept_dead;
            recovered += swept_recovered;
        }
        Ok((dead, recovered))
    }

    fn sweep(graph: &mut MirGraph, ctx: &CompileContext) -> Result<(usize, usize)> {
        let mut dead = 0;
        let mut recovered = 0;
        let mut pending: Vec<ValueId> = Vec::new();

        for block in graph.postorder() {
            ctx.check_cancelled("redundancy")?;
            for &ins in graph[block].instructions().to_vec().iter().rev() {
                pending.try_reserve(1)?;
                pending.push(ins);

                while let Some(id) = pending.pop() {
                    if !graph.contains_value(id) {
                        continue;
                    }
                    match Self::liveness(graph, id) {
                        Liveness::Live => {}
                        Liveness::Recoverable => {
                            graph.set_flag(id, DefFlags::RECOVERED_ON_BAILOUT, true);
                            recovered += 1;
                            ctx.events
                                .record(EventKind::MarkedRecoverable)
                                .unit(graph.name())
                                .block(graph[id].block())
                                .value(id)
                                .message(format!("{id} only feeds snapshots"));
                            for operand in graph[id].operands().to_vec() {
                                if !graph[operand].is_phi() {
                                    pending.try_reserve(1)?;
                                    pending.push(operand);
                                }
                            }
                        }
                        Liveness::Dead => {
                            let owner = graph[id].block();
                            let mnemonic = graph[id].op().mnemonic();
                            let operands = graph[id].operands().to_vec();
                            graph.discard(id)?;
                            dead += 1;
                            ctx.events
                                .record(EventKind::InstructionRemoved)
                                .unit(graph.name())
                                .block(owner)
                                .value(id)
                                .message(format!("dead {mnemonic} {id}"));
                            for operand in operands {
                                if graph.contains_value(operand) && !graph[operand].is_phi() {
                                    pending.try_reserve(1)?;
                                    pending.push(operand);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok((dead, recovered))
    }
}

impl MirPass for RedundancyEliminationPass {
    fn name(&self) -> &'static str {
        "redundancy"
    }

    fn description(&self) -> &'static str {
        "Bounds-check folding, type-guard elimination and dead code removal"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let stats = Self::eliminate_redundancy(graph, ctx)?;
        debug!(
            unit = graph.name(),
            bounds_checks = stats.bounds_checks,
            type_guards = stats.type_guards,
            dead = stats.dead,
            recovered = stats.recovered,
            "redundancy eliminated"
        );
        Ok(stats.changed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{ArithOp, GuardFilter, MirBuilder, MirType, UnboxMode};

    fn ctx() -> CompileContext {
        CompileContext::default()
    }

    #[test]
    fn test_repeated_access_in_loop() {
        // for (i = 0; ...; i++) { arr[i]; arr[i]; }
        let mut b = MirBuilder::new("loop");
        let entry = b.entry();
        let header = b.block().unwrap();
        let body = b.block().unwrap();
        let exit = b.block().unwrap();
        b.edge(entry, header).unwrap();
        b.edge(body, header).unwrap();

        let p = b.parameter(entry, 0).unwrap();
        let arr = b.unbox(entry, p, MirType::Object, UnboxMode::Fallible).unwrap();
        let len = b.array_length(entry, arr).unwrap();
        let zero = b.int32(entry, 0).unwrap();
        let one = b.int32(entry, 1).unwrap();
        b.goto(entry, header).unwrap();
        let i = b.phi(header, &[zero, zero]).unwrap();
        let more = b
            .compare(header, crate::mir::CompareOp::Lt, MirType::Int32, i, len)
            .unwrap();
        b.test(header, more, body, exit).unwrap();
        let first = b.bounds_check(body, i, len).unwrap();
        let a = b.load_element(body, arr, first, MirType::Int32).unwrap();
        let second = b.bounds_check(body, i, len).unwrap();
        let c = b.load_element(body, arr, second, MirType::Int32).unwrap();
        let sum = b.add(body, MirType::Int32, a, c).unwrap();
        b.store_element(body, arr, i, sum, MirType::Int32).unwrap();
        let next = b.add(body, MirType::Int32, i, one).unwrap();
        b.goto(body, header).unwrap();
        b.set_phi_operand(i, 1, next).unwrap();
        b.loop_blocks(header, body, &[body], 1);
        b.ret(exit, zero).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(stats.bounds_checks, 1);
        assert!(!graph.contains_value(second));
        assert_eq!(
            graph[first].op(),
            &MirOp::BoundsCheck {
                minimum: 0,
                maximum: 0
            }
        );
        assert_eq!(graph[c].operands()[1], i);
        assert!(context.events.has(EventKind::BoundsCheckEliminated));
    }

    #[test]
    fn test_adjacent_offsets_collapse() {
        // a[i] + a[i + 1]
        let mut b = MirBuilder::new("adjacent");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let arr = b.unbox(entry, p, MirType::Object, UnboxMode::Fallible).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let len = b.array_length(entry, arr).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let first = b.bounds_check(entry, i, len).unwrap();
        let x = b.load_element(entry, arr, first, MirType::Int32).unwrap();
        let next = b.add(entry, MirType::Int32, i, one).unwrap();
        let second = b.bounds_check(entry, next, len).unwrap();
        let y = b.load_element(entry, arr, second, MirType::Int32).unwrap();
        let sum = b.add(entry, MirType::Int32, x, y).unwrap();
        b.ret(entry, sum).unwrap();
        let mut graph = b.finish();

        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &ctx()).unwrap();
        assert_eq!(stats.bounds_checks, 1);
        let checks: Vec<&MirOp> = graph
            .values()
            .filter(|v| matches!(v.op(), MirOp::BoundsCheck { .. }))
            .map(|v| v.op())
            .collect();
        assert_eq!(
            checks,
            vec![&MirOp::BoundsCheck {
                minimum: 0,
                maximum: 1
            }]
        );
        assert_eq!(graph[y].operands()[1], next);
    }

    #[test]
    fn test_sibling_checks_both_kept() {
        let mut b = MirBuilder::new("siblings");
        let entry = b.entry();
        let left = b.block().unwrap();
        let right = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        let arr = b.unbox(entry, p, MirType::Object, UnboxMode::Fallible).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let len = b.array_length(entry, arr).unwrap();
        b.test(entry, p, left, right).unwrap();
        let a = b.bounds_check(left, i, len).unwrap();
        b.ret(left, a).unwrap();
        let c = b.bounds_check(right, i, len).unwrap();
        b.ret(right, c).unwrap();
        let mut graph = b.finish();

        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &ctx()).unwrap();
        assert_eq!(stats.bounds_checks, 0);
        assert!(graph.contains_value(a));
        assert!(graph.contains_value(c));
    }

    #[test]
    fn test_dead_chain_removed() {
        let mut b = MirBuilder::new("dead");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let two = b.int32(entry, 2).unwrap();
        let sum = b.add(entry, MirType::Int32, one, two).unwrap();
        let product = b.arith(entry, crate::mir::ArithOp::Mul, MirType::Int32, sum, sum).unwrap();
        b.ret(entry, p).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(stats.dead, 4);
        for id in [one, two, sum, product] {
            assert!(!graph.contains_value(id));
        }
        assert!(graph.contains_value(p));
        assert_eq!(context.events.count_kind(EventKind::InstructionRemoved), 4);
    }

    #[test]
    fn test_guards_and_captured_values_kept() {
        let mut b = MirBuilder::new("kept");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let sum = b.add(entry, MirType::Int32, n, one).unwrap();
        let call = b.call(entry, p, &[]).unwrap();
        b.resume_after(call, &[(sum, true)]).unwrap();
        let boxed = b.box_value(entry, one).unwrap();
        b.resume_after(boxed, &[]).unwrap();
        b.ret(entry, p).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(stats.dead, 0);
        // The fallible unbox is a guard.
        assert!(graph.contains_value(n));
        // The box carries a snapshot.
        assert!(graph.contains_value(boxed));
        // The add only feeds a snapshot and can be rebuilt on bailout.
        assert_eq!(stats.recovered, 1);
        assert!(graph[sum].has(DefFlags::RECOVERED_ON_BAILOUT));
        assert!(context.events.has(EventKind::MarkedRecoverable));
    }

    #[test]
    fn test_recoverable_chain_marked() {
        // sum = n + 1; prod = sum * sum; call; resume after with prod
        let mut b = MirBuilder::new("chain");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let sum = b.add(entry, MirType::Int32, n, one).unwrap();
        let prod = b.arith(entry, ArithOp::Mul, MirType::Int32, sum, sum).unwrap();
        let call = b.call(entry, p, &[]).unwrap();
        b.resume_after(call, &[(prod, false)]).unwrap();
        b.ret(entry, p).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(stats.dead, 0);
        assert_eq!(stats.recovered, 2);
        assert!(graph[prod].has(DefFlags::RECOVERED_ON_BAILOUT));
        assert!(graph[sum].has(DefFlags::RECOVERED_ON_BAILOUT));
        // Not recoverable, so it stays live for the rebuild.
        assert!(!graph[n].has(DefFlags::RECOVERED_ON_BAILOUT));
        assert!(graph.contains_value(n));

        let again = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(again.recovered, 0);
    }

    #[test]
    fn test_guard_removed_during_walk() {
        let mut b = MirBuilder::new("guard");
        let entry = b.entry();
        let then_block = b.block().unwrap();
        let else_block = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        b.test(entry, p, then_block, else_block).unwrap();
        let guard = b.type_guard(then_block, p, GuardFilter::all()).unwrap();
        b.ret(then_block, guard).unwrap();
        b.ret(else_block, p).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        let stats = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap();
        assert_eq!(stats.type_guards, 1);
        assert!(!graph.contains_value(guard));
        assert!(context.events.has(EventKind::TypeGuardEliminated));
    }

    #[test]
    fn test_cancelled_walk() {
        let mut graph = MirBuilder::new("cancel").finish();
        let context = CompileContext::default().with_cancellation(|| true);
        let err = RedundancyEliminationPass::eliminate_redundancy(&mut graph, &context).unwrap_err();
        assert!(err.is_cancelled());
    }
}
