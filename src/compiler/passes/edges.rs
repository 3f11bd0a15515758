//! Critical-edge splitting.
//!
//! An edge is critical when its source has several successors and its
//! target has several predecessors. Code placed "on" such an edge (a
//! conversion feeding a phi, for instance) has nowhere to go: the end of
//! the source runs on other paths too, and the start of the target is
//! reached from other predecessors. This pass gives every critical edge its
//! own block.
//!
//! # Example
//!
//! ```text
//!     b0              b0
//!    /  \            /  \
//!   b1   |   =>    b1    b4
//!    \  /            \  /
//!     b2              b2
//! ```
//!
//! The synthetic block takes the predecessor slot of the original source,
//! so phi operands of the target stay in place. Afterwards
//! [`GraphProperties::CRITICAL_EDGES_SPLIT`] holds.

use tracing::debug;

use crate::{
    compiler::{CompileContext, EventKind, MirPass},
    mir::{BlockId, GraphProperties, MirGraph},
    Result,
};

/// Splits every critical edge with an empty block.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeSplitPass;

impl EdgeSplitPass {
    /// Splits the critical edges of `graph` and returns how many were split.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory).
    pub fn split_critical_edges(graph: &mut MirGraph, ctx: &CompileContext) -> Result<usize> {
        let mut split = 0;
        let blocks: Vec<BlockId> = graph.block_order().to_vec();

        for block in blocks {
            ctx.check_cancelled("edges")?;
            let successors = graph[block].successors().len();
            if successors < 2 {
                continue;
            }
            for index in 0..successors {
                let target = graph[block].successors()[index];
                if graph[target].predecessors().len() < 2 {
                    continue;
                }
                let inserted = graph.split_edge(block, index)?;
                ctx.events
                    .record(EventKind::EdgeSplit)
                    .unit(graph.name())
                    .block(inserted)
                    .message(format!("{block} -> {target} through {inserted}"));
                split += 1;
            }
        }

        graph.set_property(GraphProperties::CRITICAL_EDGES_SPLIT, true);
        Ok(split)
    }
}

impl MirPass for EdgeSplitPass {
    fn name(&self) -> &'static str {
        "edges"
    }

    fn description(&self) -> &'static str {
        "Critical-edge splitting"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let split = Self::split_critical_edges(graph, ctx)?;
        debug!(unit = graph.name(), split, "critical edges split");
        Ok(split > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockKind, GraphVerifier, MirBuilder, MirType};

    fn has_critical_edge(graph: &MirGraph) -> bool {
        graph.blocks().any(|b| {
            b.successors().len() > 1
                && b.successors()
                    .iter()
                    .any(|&s| graph[s].predecessors().len() > 1)
        })
    }

    #[test]
    fn test_triangle() {
        //   b0
        //   | \
        //   b1 |
        //   | /
        //   b2
        let mut b = MirBuilder::new("triangle");
        let b0 = b.entry();
        let b1 = b.block().unwrap();
        let b2 = b.block().unwrap();
        let p = b.parameter(b0, 0).unwrap();
        b.test(b0, p, b1, b2).unwrap();
        let one = b.int32(b1, 1).unwrap();
        b.goto(b1, b2).unwrap();
        let phi = b.phi(b2, &[p, one]).unwrap();
        b.ret(b2, phi).unwrap();
        let mut graph = b.finish();

        let ctx = CompileContext::default();
        assert!(EdgeSplitPass.run(&mut graph, &ctx).unwrap());
        assert!(!has_critical_edge(&graph));

        let split = graph[b0].successors()[1];
        assert_eq!(graph[split].kind(), BlockKind::SplitEdge);
        assert_eq!(graph[b2].predecessors(), &[split, b1]);
        assert_eq!(graph[phi].operands(), &[p, one]);
        assert_eq!(ctx.events.count_kind(EventKind::EdgeSplit), 1);
        assert!(GraphVerifier::verify(&graph).is_ok());
    }

    #[test]
    fn test_diamond_untouched() {
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
        let mut graph = b.finish();

        let ctx = CompileContext::default();
        assert!(!EdgeSplitPass.run(&mut graph, &ctx).unwrap());
        assert_eq!(graph.block_count(), 4);
        assert!(graph.properties().contains(GraphProperties::CRITICAL_EDGES_SPLIT));
    }

    #[test]
    fn test_nested_loops() {
        //   b0
        //   |
        //   b1 <----+
        //   |       |
        //   b2 <-+  |
        //   | \__/  |
        //   b3 -----+
        //   |
        //   b4
        let mut b = MirBuilder::new("nested");
        let b0 = b.entry();
        let b1 = b.block().unwrap();
        let b2 = b.block().unwrap();
        let b3 = b.block().unwrap();
        let b4 = b.block().unwrap();
        let zero = b.int32(b0, 0).unwrap();
        b.goto(b0, b1).unwrap();
        b.edge(b1, b2).unwrap();
        b.edge(b3, b1).unwrap();
        let outer = b.phi(b1, &[zero, zero]).unwrap();
        b.goto(b1, b2).unwrap();
        b.edge(b2, b2).unwrap();
        b.edge(b2, b3).unwrap();
        let inner = b.phi(b2, &[outer, zero]).unwrap();
        let next = b.add(b2, MirType::Int32, inner, inner).unwrap();
        b.set_phi_operand(inner, 1, next).unwrap();
        b.test(b2, next, b2, b3).unwrap();
        b.set_phi_operand(outer, 1, next).unwrap();
        b.edge(b3, b4).unwrap();
        b.test(b3, next, b1, b4).unwrap();
        b.ret(b4, next).unwrap();
        b.loop_blocks(b1, b3, &[b2, b3], 1);
        b.loop_blocks(b2, b2, &[], 2);

        let mut graph = b.finish();
        let ctx = CompileContext::default();
        let split = EdgeSplitPass::split_critical_edges(&mut graph, &ctx).unwrap();
        // b2 -> b2 and b3 -> b1
        assert_eq!(split, 2);
        assert!(!has_critical_edge(&graph));
        assert_eq!(graph[graph[b2].backedge().unwrap()].kind(), BlockKind::SplitEdge);
        assert_eq!(graph[graph[b1].backedge().unwrap()].kind(), BlockKind::SplitEdge);
        assert!(GraphVerifier::verify(&graph).is_ok());
    }
}
