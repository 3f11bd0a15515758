//! Dominator tree construction.
//!
//! Uses the iterative algorithm of Cooper, Harvey and Kennedy ("A Simple,
//! Fast Dominance Algorithm"):
//!
//! 1. Renumber blocks in reverse post-order so every block's number exceeds
//!    its dominators' numbers.
//! 2. Roots dominate themselves. Every other block takes the intersection
//!    of its already processed predecessors' dominators, found by walking
//!    the two candidates up the partial tree, always moving the one with
//!    the larger number, until they meet.
//! 3. Repeat until no immediate dominator changes.
//!
//! A block reached from both the entry and the OSR root has no common
//! dominator; it becomes a root of its own.
//!
//! Afterwards each block knows its dominated children, the size of its
//! dominated subtree and its index in a pre-order walk of the tree, which
//! turns [`MirGraph::dominates`] into an interval test.

use tracing::debug;

use crate::{
    compiler::{CompileContext, MirPass},
    mir::{BlockId, GraphProperties, MirGraph},
    Result,
};

/// Computes immediate dominators and the dominator tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DominatorPass;

impl DominatorPass {
    /// Renumbers `graph` and rebuilds its dominator tree.
    ///
    /// Returns the number of fixpoint iterations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn build_dominator_tree(graph: &mut MirGraph, ctx: &CompileContext) -> Result<usize> {
        graph.renumber_blocks();
        graph.clear_dominator_tree();
        let rpo = graph.reverse_postorder();
        let roots: Vec<BlockId> = graph.roots().collect();

        for &root in &roots {
            graph.block_mut(root).idom = Some(root);
        }

        let mut iterations = 0;
        let mut changed = true;
        while changed {
            ctx.check_cancelled("dominators")?;
            iterations += 1;
            changed = false;

            for &block in &rpo {
                if roots.contains(&block) {
                    continue;
                }
                let idom = Self::intersect_predecessors(graph, block);
                if graph[block].idom != Some(idom) {
                    graph.block_mut(block).idom = Some(idom);
                    changed = true;
                }
            }
        }

        Self::build_children(graph, &rpo)?;
        Self::count_dominated(graph, &rpo);
        Self::assign_preorder(graph, &rpo)?;
        graph.set_property(GraphProperties::DOMINATOR_TREE, true);
        Ok(iterations)
    }

    /// Intersects the dominators of the predecessors of `block` that
    /// already have one. Yields `block` itself when they share no ancestor.
    fn intersect_predecessors(graph: &MirGraph, block: BlockId) -> BlockId {
        let mut candidate: Option<BlockId> = None;
        for &pred in graph[block].predecessors() {
            if graph[pred].immediate_dominator().is_none() {
                continue;
            }
            candidate = match candidate {
                None => Some(pred),
                Some(current) => match Self::intersect(graph, pred, current) {
                    Some(common) => Some(common),
                    None => return block,
                },
            };
        }
        candidate.unwrap_or(block)
    }

    fn intersect(graph: &MirGraph, mut a: BlockId, mut b: BlockId) -> Option<BlockId> {
        while a != b {
            while graph[a].number() > graph[b].number() {
                a = Self::step_up(graph, a)?;
            }
            while graph[b].number() > graph[a].number() {
                b = Self::step_up(graph, b)?;
            }
        }
        Some(a)
    }

    /// Moves one level up the partial tree; `None` at a root.
    fn step_up(graph: &MirGraph, block: BlockId) -> Option<BlockId> {
        let idom = graph[block].immediate_dominator()?;
        (idom != block).then_some(idom)
    }

    fn build_children(graph: &mut MirGraph, rpo: &[BlockId]) -> Result<()> {
        for &block in rpo {
            let Some(idom) = graph[block].immediate_dominator() else {
                continue;
            };
            if idom != block {
                let children = &mut graph.block_mut(idom).dominated;
                children.try_reserve(1)?;
                children.push(block);
            }
        }
        Ok(())
    }

    /// Children follow their dominator in reverse post-order, so walking it
    /// backwards sees every subtree before its root.
    fn count_dominated(graph: &mut MirGraph, rpo: &[BlockId]) {
        for &block in rpo.iter().rev() {
            let below: usize = graph[block]
                .dominated()
                .iter()
                .map(|&child| graph[child].num_dominated())
                .sum();
            graph.block_mut(block).num_dominated = below + 1;
        }
    }

    fn assign_preorder(graph: &mut MirGraph, rpo: &[BlockId]) -> Result<()> {
        let mut stack: Vec<BlockId> = Vec::new();
        stack.try_reserve(rpo.len())?;
        stack.extend(
            rpo.iter()
                .rev()
                .copied()
                .filter(|&b| graph[b].is_dominator_root()),
        );

        let mut index = 0;
        while let Some(block) = stack.pop() {
            graph.block_mut(block).dom_index = index;
            index += 1;
            stack.extend(graph[block].dominated().iter().rev().copied());
        }
        Ok(())
    }
}

impl MirPass for DominatorPass {
    fn name(&self) -> &'static str {
        "dominators"
    }

    fn description(&self) -> &'static str {
        "Reverse post-order numbering and dominator tree"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let before = graph.block_order().to_vec();
        let iterations = Self::build_dominator_tree(graph, ctx)?;
        debug!(
            unit = graph.name(),
            blocks = graph.block_count(),
            iterations,
            "dominator tree built"
        );
        Ok(before != graph.block_order())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{GraphVerifier, MirBuilder};

    /// ```text
    ///     b0
    ///    /  \
    ///   b1  b2
    ///    \  /
    ///     b3
    /// ```
    fn diamond() -> (MirGraph, [BlockId; 4]) {
        let mut b = MirBuilder::new("diamond");
        let b0 = b.entry();
        let b1 = b.block().unwrap();
        let b2 = b.block().unwrap();
        let b3 = b.block().unwrap();
        let p = b.parameter(b0, 0).unwrap();
        b.test(b0, p, b1, b2).unwrap();
        b.goto(b1, b3).unwrap();
        b.goto(b2, b3).unwrap();
        b.ret(b3, p).unwrap();
        (b.finish(), [b0, b1, b2, b3])
    }

    #[test]
    fn test_diamond() {
        let (mut graph, [b0, b1, b2, b3]) = diamond();
        let ctx = CompileContext::default();
        DominatorPass::build_dominator_tree(&mut graph, &ctx).unwrap();

        assert_eq!(graph[b0].immediate_dominator(), Some(b0));
        assert_eq!(graph[b1].immediate_dominator(), Some(b0));
        assert_eq!(graph[b2].immediate_dominator(), Some(b0));
        assert_eq!(graph[b3].immediate_dominator(), Some(b0));
        assert_eq!(graph[b0].num_dominated(), 4);
        assert_eq!(graph[b1].num_dominated(), 1);

        assert!(graph.dominates(b0, b3));
        assert!(graph.dominates(b1, b1));
        assert!(!graph.dominates(b1, b3));
        assert!(!graph.dominates(b3, b0));
        assert!(GraphVerifier::verify(&graph).is_ok());
    }

    #[test]
    fn test_loop_chain() {
        //   b0 -> b1 <-> b2
        //         |
        //         b3
        let mut b = MirBuilder::new("loop");
        let b0 = b.entry();
        let b1 = b.block().unwrap();
        let b2 = b.block().unwrap();
        let b3 = b.block().unwrap();
        let p = b.parameter(b0, 0).unwrap();
        b.goto(b0, b1).unwrap();
        b.test(b1, p, b2, b3).unwrap();
        b.goto(b2, b1).unwrap();
        b.ret(b3, p).unwrap();
        b.loop_blocks(b1, b2, &[b2], 1);
        let mut graph = b.finish();

        let ctx = CompileContext::default();
        DominatorPass.run(&mut graph, &ctx).unwrap();
        assert_eq!(graph[b2].immediate_dominator(), Some(b1));
        assert_eq!(graph[b3].immediate_dominator(), Some(b1));
        assert_eq!(graph[b1].dominated(), &[b3, b2]);
        assert_eq!(graph[b1].num_dominated(), 3);
        assert_eq!(graph[b0].dom_index(), 0);
        assert_eq!(graph[b1].dom_index(), 1);
        assert!(graph.dominates(b1, b2));
        assert!(!graph.dominates(b2, b3));
        assert!(GraphVerifier::verify(&graph).is_ok());
    }

    #[test]
    fn test_osr_entry_creates_second_tree() {
        //   b0   b2 (osr)
        //     \  /
        //      b1 <-+
        //      | \__/
        //      b3
        let mut b = MirBuilder::new("osr");
        let b0 = b.entry();
        let b1 = b.block().unwrap();
        let b2 = b.block().unwrap();
        let b3 = b.block().unwrap();
        let p = b.parameter(b0, 0).unwrap();
        b.goto(b0, b1).unwrap();
        b.osr_entry(b2).unwrap();
        let q = b.parameter(b2, 0).unwrap();
        b.goto(b2, b1).unwrap();
        b.edge(b1, b1).unwrap();
        b.edge(b1, b3).unwrap();
        let phi = b.phi(b1, &[p, q, p]).unwrap();
        b.set_phi_operand(phi, 2, phi).unwrap();
        b.test(b1, phi, b1, b3).unwrap();
        b.ret(b3, phi).unwrap();
        let mut graph = b.finish();

        let ctx = CompileContext::default();
        DominatorPass::build_dominator_tree(&mut graph, &ctx).unwrap();
        assert_eq!(graph[b0].immediate_dominator(), Some(b0));
        assert_eq!(graph[b2].immediate_dominator(), Some(b2));
        assert_eq!(graph[b1].immediate_dominator(), Some(b1));
        assert_eq!(graph[b3].immediate_dominator(), Some(b1));
        let roots_total: usize = graph
            .blocks()
            .filter(|blk| blk.is_dominator_root())
            .map(|blk| blk.num_dominated())
            .sum();
        assert_eq!(roots_total, graph.block_count());
        assert!(GraphVerifier::verify(&graph).is_ok());
    }

    #[test]
    fn test_cancellation_inside_fixpoint() {
        let (mut graph, _) = diamond();
        let ctx = CompileContext::default().with_cancellation(|| true);
        let err = DominatorPass::build_dominator_tree(&mut graph, &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }
}
