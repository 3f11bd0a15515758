//! Block traversal views.
//!
//! All views are computed on demand from the CFG edges, so they are always
//! consistent with the current graph even after passes insert blocks.
//!
//! - [`MirGraph::preorder`] - depth-first pre-order from the roots
//! - [`MirGraph::postorder`] - depth-first post-order from the roots
//! - [`MirGraph::reverse_postorder`] - forward data-flow order
//! - [`MirGraph::postorder_predecessors`] - post-order over predecessor
//!   edges starting at the exits, i.e. post-order of the reverse CFG
//!
//! Unreachable blocks appear in none of the views.

use crate::mir::{BlockId, MirGraph};

#[derive(Clone, Copy)]
enum State {
    Enter,
    Exit,
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

impl MirGraph {
    /// Returns reachable blocks in depth-first pre-order.
    #[must_use]
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.block_capacity()];
        let mut result = Vec::with_capacity(self.block_count());
        let mut stack: Vec<BlockId> = self.roots().collect();
        stack.reverse();

        while let Some(block) = stack.pop() {
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            result.push(block);
            for &succ in self[block].successors().iter().rev() {
                if !visited[succ.index()] {
                    stack.push(succ);
                }
            }
        }
        result
    }

    /// Returns reachable blocks in depth-first post-order.
    #[must_use]
    pub fn postorder(&self) -> Vec<BlockId> {
        let roots: Vec<BlockId> = self.roots().collect();
        self.depth_first_postorder(&roots, Direction::Forward)
    }

    /// Returns reachable blocks in reverse post-order.
    ///
    /// Every block appears after all of its dominators.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Returns blocks in post-order over predecessor edges, starting from
    /// the blocks without successors.
    #[must_use]
    pub fn postorder_predecessors(&self) -> Vec<BlockId> {
        let exits: Vec<BlockId> = self
            .block_order()
            .iter()
            .copied()
            .filter(|&b| self[b].successors().is_empty())
            .collect();
        self.depth_first_postorder(&exits, Direction::Backward)
    }

    fn depth_first_postorder(&self, starts: &[BlockId], direction: Direction) -> Vec<BlockId> {
        let mut visited = vec![false; self.block_capacity()];
        let mut result = Vec::with_capacity(self.block_count());
        let mut stack: Vec<(BlockId, State)> =
            starts.iter().rev().map(|&b| (b, State::Enter)).collect();

        while let Some((block, state)) = stack.pop() {
            match state {
                State::Enter => {
                    if visited[block.index()] {
                        continue;
                    }
                    visited[block.index()] = true;
                    stack.push((block, State::Exit));

                    let next = match direction {
                        Direction::Forward => self[block].successors(),
                        Direction::Backward => self[block].predecessors(),
                    };
                    // Reverse so the first edge is explored first
                    for &succ in next.iter().rev() {
                        if !visited[succ.index()] {
                            stack.push((succ, State::Enter));
                        }
                    }
                }
                State::Exit => result.push(block),
            }
        }
        result
    }

    /// Reorders blocks in reverse post-order and assigns each its position
    /// as block number. Unreachable blocks keep their relative order at the
    /// end.
    pub fn renumber_blocks(&mut self) {
        let mut order = self.reverse_postorder();
        let mut reachable = vec![false; self.block_capacity()];
        for block in &order {
            reachable[block.index()] = true;
        }
        order.extend(
            self.block_order()
                .iter()
                .copied()
                .filter(|b| !reachable[b.index()]),
        );
        for (number, &block) in order.iter().enumerate() {
            self.block_mut(block).number = number;
        }
        self.set_order(order);
    }
}
