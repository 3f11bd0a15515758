//! Phi reduction.
//!
//! Two rewrites share one worklist:
//!
//! - **Redundancy**: a phi whose operands are all either itself or one
//!   single other value `v` is replaced by `v`.
//! - **Liveness**: a phi is observed if a non-phi instruction consumes it
//!   (or, in [`Observability::Conservative`] mode, an observable snapshot
//!   slot captures it). Observed phis seed a worklist that propagates
//!   backwards through phi operands; phis never reached are unused and
//!   discarded.
//!
//! Removing a phi can make another one redundant, e.g. `phi(a, dead)`
//! collapses to `a` once `dead` is gone from the picture. When a phi popped
//! from the worklist turns out to be redundant, its uses move to the
//! replacement and every phi consuming it is re-examined.
//!
//! Uses left on unused phis (non-observable snapshot slots, and in
//! aggressive mode observable ones too) are redirected to the block's
//! optimized-out constant before the phi is discarded.
//!
//! Afterwards [`GraphProperties::PHIS_REDUCED`] holds.

use tracing::debug;

use crate::{
    compiler::{CompileContext, EventKind, MirPass, Observability},
    mir::{BlockId, DefFlags, GraphProperties, MirGraph, UseSite, ValueId},
    utils::{IdSet, Worklist},
    Result,
};

/// Removes redundant and unobservable phis.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhiEliminationPass {
    observability: Observability,
}

impl PhiEliminationPass {
    /// Creates a phi reducer with the given observability mode.
    #[must_use]
    pub const fn new(observability: Observability) -> Self {
        Self { observability }
    }

    /// Returns the observability mode.
    #[must_use]
    pub const fn observability(&self) -> Observability {
        self.observability
    }

    /// Reduces the phis of `graph` and returns how many were discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn eliminate_phis(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<usize> {
        let capacity = graph.value_capacity();
        let mut unused: IdSet<ValueId> = IdSet::with_capacity(capacity);
        let mut worklist: Worklist<ValueId> = Worklist::with_capacity(capacity);
        let mut removed = 0;

        // Initial sweep: fold redundant phis on sight, seed observed ones.
        for block in graph.postorder() {
            ctx.check_cancelled("phis")?;
            let phis = graph[block].phis().to_vec();
            for phi in phis {
                if let Some(replacement) = redundant_operand(graph, phi) {
                    Self::replace_phi(graph, phi, replacement)?;
                    graph.discard(phi)?;
                    Self::record_removed(graph, ctx, block, phi, "redundant");
                    removed += 1;

                    if graph[replacement].is_phi()
                        && unused.contains(replacement)
                        && self.is_observable(graph, replacement)
                    {
                        worklist.push(replacement)?;
                    }
                    continue;
                }

                unused.insert(phi)?;
                if self.is_observable(graph, phi) {
                    worklist.push(phi)?;
                }
            }
        }

        while let Some(phi) = worklist.pop() {
            ctx.check_cancelled("phis")?;

            if let Some(replacement) = redundant_operand(graph, phi) {
                // Consumers now see the replacement; let them re-decide.
                for site in graph[phi].uses().to_vec() {
                    let UseSite::Value { consumer, .. } = site else {
                        continue;
                    };
                    if consumer != phi && graph[consumer].is_phi() && !unused.contains(consumer) {
                        unused.insert(consumer)?;
                        worklist.push(consumer)?;
                    }
                }
                Self::replace_phi(graph, phi, replacement)?;
            } else {
                unused.remove(phi);
            }

            for &operand in graph[phi].operands() {
                if operand != phi
                    && graph[operand].is_phi()
                    && unused.contains(operand)
                    && !worklist.contains(operand)
                {
                    worklist.push(operand)?;
                }
            }
        }

        removed += Self::sweep(graph, ctx, &unused)?;
        graph.set_property(GraphProperties::PHIS_REDUCED, true);
        Ok(removed)
    }

    /// Returns `true` if something other than a phi observes `phi`.
    fn is_observable(&self, graph: &MirGraph, phi: ValueId) -> bool {
        let value = &graph[phi];
        if value.has(DefFlags::IMPLICITLY_USED) {
            return true;
        }
        value.uses().iter().any(|site| match *site {
            UseSite::Value { consumer, .. } => !graph[consumer].is_phi(),
            UseSite::Snapshot { snapshot, index } => {
                self.observability == Observability::Conservative
                    && graph[snapshot].operands()[index].observable
            }
        })
    }

    fn replace_phi(graph: &mut MirGraph, phi: ValueId, replacement: ValueId) -> Result<()> {
        if graph[phi].has(DefFlags::IMPLICITLY_USED) {
            graph.set_flag(replacement, DefFlags::IMPLICITLY_USED, true);
        }
        graph.replace_all_uses_with(phi, replacement)
    }

    /// Discards every phi left unused, moving leftover uses to the
    /// optimized-out constant of the phi's block.
    fn sweep(graph: &mut MirGraph, ctx: &CompileContext, unused: &IdSet<ValueId>) -> Result<usize> {
        let dead: Vec<ValueId> = unused.iter().filter(|&v| graph.contains_value(v)).collect();
        let mut placeholders: Vec<ValueId> = Vec::new();

        for &phi in &dead {
            if graph[phi].has_uses() {
                let block = graph[phi].block();
                let placeholder = graph.optimized_out(block)?;
                graph.replace_all_uses_with(phi, placeholder)?;
                if !placeholders.contains(&placeholder) {
                    placeholders.try_reserve(1)?;
                    placeholders.push(placeholder);
                }
            }
        }
        for &phi in &dead {
            let block = graph[phi].block();
            graph.discard(phi)?;
            Self::record_removed(graph, ctx, block, phi, "unobservable");
        }
        // Placeholders that only fed other dead phis are dead themselves.
        for placeholder in placeholders {
            if !graph[placeholder].has_uses() {
                graph.discard(placeholder)?;
            }
        }
        Ok(dead.len())
    }

    fn record_removed(graph: &MirGraph, ctx: &CompileContext, block: BlockId, phi: ValueId, why: &str) {
        ctx.events
            .record(EventKind::PhiRemoved)
            .unit(graph.name())
            .block(block)
            .value(phi)
            .message(format!("{phi} in {block} is {why}"));
    }
}

/// Returns the single value a phi merges, ignoring self references.
pub(crate) fn redundant_operand(graph: &MirGraph, phi: ValueId) -> Option<ValueId> {
    let mut single = None;
    for &operand in graph[phi].operands() {
        if operand == phi {
            continue;
        }
        match single {
            None => single = Some(operand),
            Some(seen) if seen == operand => {}
            Some(_) => return None,
        }
    }
    single
}

impl MirPass for PhiEliminationPass {
    fn name(&self) -> &'static str {
        "phis"
    }

    fn description(&self) -> &'static str {
        "Redundant and unobservable phi elimination"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let removed = self.eliminate_phis(graph, ctx)?;
        debug!(
            unit = graph.name(),
            removed,
            mode = ?self.observability,
            "phis reduced"
        );
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{GraphVerifier, MirBuilder, MirType};

    struct Loop {
        builder: MirBuilder,
        header: BlockId,
        body: BlockId,
        exit: BlockId,
        zero: ValueId,
        one: ValueId,
        param: ValueId,
    }

    /// ```text
    ///   b0
    ///   |
    ///   b1 <-+
    ///   | \  |
    ///   |  b2
    ///   b3
    /// ```
    ///
    /// The header's predecessors are `[b0, b2]`; phis are left to the test.
    fn open_loop() -> Loop {
        let mut b = MirBuilder::new("loop");
        let entry = b.entry();
        let header = b.block().unwrap();
        let body = b.block().unwrap();
        let exit = b.block().unwrap();
        let zero = b.int32(entry, 0).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let param = b.parameter(entry, 0).unwrap();
        b.goto(entry, header).unwrap();
        b.edge(body, header).unwrap();
        b.loop_blocks(header, body, &[body], 1);
        Loop {
            builder: b,
            header,
            body,
            exit,
            zero,
            one,
            param,
        }
    }

    fn close_loop(l: &mut Loop, result: ValueId) {
        let b = &mut l.builder;
        b.test(l.header, l.param, l.body, l.exit).unwrap();
        b.goto(l.body, l.header).unwrap();
        b.ret(l.exit, result).unwrap();
    }

    fn run(graph: &mut MirGraph, observability: Observability) -> usize {
        let ctx = CompileContext::default();
        let removed = PhiEliminationPass::new(observability)
            .eliminate_phis(graph, &ctx)
            .unwrap();
        let report = GraphVerifier::verify(graph);
        assert!(report.is_ok(), "{:?}\n{graph}", report.issues);
        removed
    }

    #[test]
    fn test_distinct_operands_survive() {
        // function f(a) { var x = a ? 1 : 2; return x + x; }
        let mut b = MirBuilder::new("f");
        let entry = b.entry();
        let then_block = b.block().unwrap();
        let else_block = b.block().unwrap();
        let join = b.block().unwrap();
        let a = b.parameter(entry, 0).unwrap();
        b.test(entry, a, then_block, else_block).unwrap();
        let one = b.int32(then_block, 1).unwrap();
        b.goto(then_block, join).unwrap();
        let two = b.int32(else_block, 2).unwrap();
        b.goto(else_block, join).unwrap();
        let x = b.phi(join, &[one, two]).unwrap();
        let sum = b.add(join, MirType::Int32, x, x).unwrap();
        b.ret(join, sum).unwrap();
        let mut graph = b.finish();

        assert_eq!(run(&mut graph, Observability::Aggressive), 0);
        assert!(graph.contains_value(x));
        assert!(graph.properties().contains(GraphProperties::PHIS_REDUCED));
    }

    #[test]
    fn test_self_referencing_loop_phi_is_redundant() {
        let mut l = open_loop();
        let phi = l.builder.phi(l.header, &[l.param, l.param]).unwrap();
        l.builder.set_phi_operand(phi, 1, phi).unwrap();
        close_loop(&mut l, phi);
        let param = l.param;
        let exit = l.exit;
        let mut graph = l.builder.finish();

        assert_eq!(run(&mut graph, Observability::Aggressive), 1);
        assert!(!graph.contains_value(phi));
        let ret = graph[exit].last_instruction().unwrap();
        assert_eq!(graph[ret].operands(), &[param]);
    }

    #[test]
    fn test_dead_phi_cycle_removed() {
        let mut l = open_loop();
        let p = l.builder.phi(l.header, &[l.zero, l.zero]).unwrap();
        let q = l.builder.phi(l.header, &[l.one, p]).unwrap();
        l.builder.set_phi_operand(p, 1, q).unwrap();
        let param = l.param;
        close_loop(&mut l, param);
        let header = l.header;
        let mut graph = l.builder.finish();

        assert_eq!(run(&mut graph, Observability::Aggressive), 2);
        assert!(graph[header].phis().is_empty());
    }

    #[test]
    fn test_used_loop_phi_keeps_its_inputs() {
        let mut l = open_loop();
        let i = l.builder.phi(l.header, &[l.zero, l.zero]).unwrap();
        let next = l.builder.add(l.body, MirType::Int32, i, l.one).unwrap();
        l.builder.set_phi_operand(i, 1, next).unwrap();
        close_loop(&mut l, i);
        let mut graph = l.builder.finish();

        assert_eq!(run(&mut graph, Observability::Aggressive), 0);
        assert!(graph.contains_value(i));
    }

    #[test]
    fn test_observability_modes_differ_on_snapshots() {
        let build = || {
            let mut l = open_loop();
            let phi = l.builder.phi(l.header, &[l.zero, l.one]).unwrap();
            let anchor = l.builder.add(l.body, MirType::Int32, l.one, l.one).unwrap();
            l.builder.resume_after(anchor, &[(phi, true)]).unwrap();
            let param = l.param;
            close_loop(&mut l, param);
            (l.builder.finish(), phi, l.body)
        };

        let (mut conservative, phi, _) = build();
        assert_eq!(run(&mut conservative, Observability::Conservative), 0);
        assert!(conservative.contains_value(phi));

        let (mut aggressive, phi, body) = build();
        assert_eq!(run(&mut aggressive, Observability::Aggressive), 1);
        assert!(!aggressive.contains_value(phi));
        let snapshot = aggressive.snapshots().next().unwrap();
        let slot = snapshot.operands()[0].value;
        assert!(aggressive[slot].op().is_optimized_out());
        assert_eq!(aggressive[slot].block(), aggressive[body].predecessors()[0]);
    }

    #[test]
    fn test_phi_of_redundant_phi_collapses() {
        // Both arms of a diamond feed the same value into the join.
        let mut b = MirBuilder::new("chain");
        let entry = b.entry();
        let left = b.block().unwrap();
        let right = b.block().unwrap();
        let join = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        b.test(entry, p, left, right).unwrap();
        b.goto(left, join).unwrap();
        b.goto(right, join).unwrap();
        let same = b.phi(join, &[p, p]).unwrap();
        let sum = b.add(join, MirType::Value, same, same).unwrap();
        b.ret(join, sum).unwrap();
        let mut graph = b.finish();

        assert_eq!(run(&mut graph, Observability::Aggressive), 1);
        assert_eq!(graph[sum].operands(), &[p, p]);
    }

    #[test]
    fn test_implicitly_used_phi_kept() {
        let mut l = open_loop();
        let phi = l.builder.phi(l.header, &[l.zero, l.one]).unwrap();
        let param = l.param;
        close_loop(&mut l, param);
        let mut graph = l.builder.finish();
        graph.set_flag(phi, DefFlags::IMPLICITLY_USED, true);

        assert_eq!(run(&mut graph, Observability::Aggressive), 0);
        assert!(graph.contains_value(phi));
    }
}
