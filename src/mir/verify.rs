//! Graph consistency verifier.
//!
//! Checks the structural invariants every pass relies on, plus the
//! invariants recorded in [`GraphProperties`]. The pipeline runs it after
//! each pass when [`PipelineConfig::verify`](crate::PipelineConfig::verify)
//! is set, which is the default in debug builds.
//!
//! Always checked:
//!
//! - predecessor and successor lists mirror each other
//! - roots have no predecessors, every other block has at least one
//! - phis have one operand per predecessor
//! - every definition sits in its block's phi or instruction list
//! - operand lists and use lists mirror each other, snapshots included
//! - exactly the last instruction of a block is a control instruction
//!
//! Checked when the corresponding property is claimed:
//!
//! - [`GraphProperties::CRITICAL_EDGES_SPLIT`]: no critical edges
//! - [`GraphProperties::DOMINATOR_TREE`]: idom soundness, child lists,
//!   dominated counts
//! - [`GraphProperties::TYPES_SPECIALIZED`]: concrete phi types, operand
//!   types matching their phi, float32 coherency

use std::collections::HashSet;

use crate::{
    mir::{
        BlockId, GraphProperties, MirGraph, MirOp, MirType, SnapshotAnchor, UseSite, ValueId,
    },
    Error, Result,
};

/// Every violation found in one verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// One message per violated invariant
    pub issues: Vec<String>,
}

impl VerificationReport {
    /// Returns `true` if no violation was found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    /// Converts the report into a result, naming the pass that ran last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VerificationFailed`] if any violation was found.
    pub fn into_result(self, pass: &str) -> Result<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(Error::VerificationFailed {
                pass: pass.to_string(),
                issues: self.issues,
            })
        }
    }
}

/// Walks a graph and collects invariant violations.
pub struct GraphVerifier<'g> {
    graph: &'g MirGraph,
    issues: Vec<String>,
}

impl<'g> GraphVerifier<'g> {
    /// Verifies `graph` and returns every violation found.
    #[must_use]
    pub fn verify(graph: &'g MirGraph) -> VerificationReport {
        let mut verifier = GraphVerifier {
            graph,
            issues: Vec::new(),
        };
        verifier.check_blocks();
        verifier.check_values();
        verifier.check_snapshots();

        let properties = graph.properties();
        if properties.contains(GraphProperties::CRITICAL_EDGES_SPLIT) {
            verifier.check_no_critical_edges();
        }
        if properties.contains(GraphProperties::DOMINATOR_TREE) {
            verifier.check_dominator_tree();
        }
        if properties.contains(GraphProperties::TYPES_SPECIALIZED) {
            verifier.check_phi_types();
            verifier.check_float32_coherency();
        }
        VerificationReport {
            issues: verifier.issues,
        }
    }

    fn report(&mut self, message: String) {
        self.issues.push(message);
    }

    fn is_root(&self, block: BlockId) -> bool {
        self.graph.roots().any(|r| r == block)
    }

    fn check_blocks(&mut self) {
        let graph = self.graph;
        for &id in graph.block_order() {
            let Some(block) = graph.try_block(id) else {
                self.report(format!("{id} is in the block order but was discarded"));
                continue;
            };

            if self.is_root(id) {
                if !block.predecessors().is_empty() {
                    self.report(format!("root {id} has predecessors"));
                }
            } else if block.predecessors().is_empty() {
                self.report(format!("{id} is not a root and has no predecessors"));
            }

            for &succ in block.successors() {
                let forward = block.successors().iter().filter(|&&s| s == succ).count();
                let backward = graph.try_block(succ).map_or(0, |s| {
                    s.predecessors().iter().filter(|&&p| p == id).count()
                });
                if forward != backward {
                    self.report(format!("edge {id} -> {succ} is not mirrored in predecessors"));
                }
            }
            for &pred in block.predecessors() {
                let mirrored = graph
                    .try_block(pred)
                    .is_some_and(|p| p.successors().contains(&id));
                if !mirrored {
                    self.report(format!("predecessor {pred} of {id} does not list it as successor"));
                }
            }

            for &phi in block.phis() {
                match graph.try_value(phi) {
                    Some(value) if value.is_phi() => {
                        if value.operands().len() != block.predecessors().len() {
                            self.report(format!(
                                "{phi} has {} operands for {} predecessors",
                                value.operands().len(),
                                block.predecessors().len()
                            ));
                        }
                        if value.block() != id {
                            self.report(format!("{phi} is listed in {id} but owned by {}", value.block()));
                        }
                    }
                    _ => self.report(format!("{id} lists {phi} as phi but it is not a live phi")),
                }
            }

            let count = block.instructions().len();
            for (position, &ins) in block.instructions().iter().enumerate() {
                let Some(value) = graph.try_value(ins) else {
                    self.report(format!("{id} lists discarded instruction {ins}"));
                    continue;
                };
                if value.is_phi() {
                    self.report(format!("{ins} is a phi in the instruction list of {id}"));
                }
                if value.block() != id {
                    self.report(format!("{ins} is listed in {id} but owned by {}", value.block()));
                }
                let last = position + 1 == count;
                if value.op().is_control() != last {
                    self.report(format!(
                        "{ins} ({}) in {id}: control instructions must end the block",
                        value.op().mnemonic()
                    ));
                }
            }
            if count == 0 {
                self.report(format!("{id} has no control instruction"));
            }

            if let Some(snapshot) = block.entry_snapshot() {
                let anchored = graph
                    .try_snapshot(snapshot)
                    .is_some_and(|s| s.anchor() == SnapshotAnchor::Entry && s.block() == id);
                if !anchored {
                    self.report(format!("entry snapshot {snapshot} of {id} is not anchored there"));
                }
            }
        }
    }

    fn check_values(&mut self) {
        let graph = self.graph;
        let listed: HashSet<ValueId> = graph
            .blocks()
            .flat_map(|b| b.phis().iter().chain(b.instructions()).copied())
            .collect();

        for value in graph.values() {
            let id = value.id();
            if !listed.contains(&id) {
                self.report(format!("{id} is live but not listed in any block"));
            }

            for (index, &operand) in value.operands().iter().enumerate() {
                let site = UseSite::Value { consumer: id, index };
                match graph.try_value(operand) {
                    None => self.report(format!("{id} operand {index} is discarded {operand}")),
                    Some(def) => {
                        let count = def.uses().iter().filter(|&&u| u == site).count();
                        if count != 1 {
                            self.report(format!(
                                "{id} operand {index} -> {operand} has {count} matching uses"
                            ));
                        }
                    }
                }
            }

            for site in value.uses() {
                let consistent = match *site {
                    UseSite::Value { consumer, index } => graph
                        .try_value(consumer)
                        .and_then(|c| c.operand(index))
                        == Some(id),
                    UseSite::Snapshot { snapshot, index } => graph
                        .try_snapshot(snapshot)
                        .and_then(|s| s.operands().get(index))
                        .map(|o| o.value)
                        == Some(id),
                };
                if !consistent {
                    self.report(format!("{id} has stale use {site:?}"));
                }
            }

            if let Some(snapshot) = value.snapshot() {
                let anchored = graph
                    .try_snapshot(snapshot)
                    .is_some_and(|s| s.anchor() == SnapshotAnchor::After(id));
                if !anchored {
                    self.report(format!("snapshot {snapshot} of {id} is not anchored after it"));
                }
            }
        }
    }

    fn check_snapshots(&mut self) {
        let graph = self.graph;
        for snapshot in graph.snapshots() {
            let id = snapshot.id();
            for (index, operand) in snapshot.operands().iter().enumerate() {
                let site = UseSite::Snapshot { snapshot: id, index };
                let linked = graph
                    .try_value(operand.value)
                    .is_some_and(|def| def.uses().contains(&site));
                if !linked {
                    self.report(format!("{id} slot {index} -> {} has no matching use", operand.value));
                }
            }
            if let SnapshotAnchor::After(owner) = snapshot.anchor() {
                let owned = graph
                    .try_value(owner)
                    .is_some_and(|v| v.snapshot() == Some(id) && v.block() == snapshot.block());
                if !owned {
                    self.report(format!("{id} is anchored after {owner} which does not own it"));
                }
            }
        }
    }

    fn check_no_critical_edges(&mut self) {
        let graph = self.graph;
        for block in graph.blocks() {
            if block.successors().len() < 2 {
                continue;
            }
            for &succ in block.successors() {
                if graph[succ].predecessors().len() != 1 {
                    self.report(format!("critical edge {} -> {succ}", block.id()));
                }
            }
        }
    }

    fn check_dominator_tree(&mut self) {
        let graph = self.graph;
        let mut root_total = 0;
        let mut reachable = 0;
        let osr_present = graph.osr_block().is_some();

        for block in graph.blocks() {
            let id = block.id();
            let Some(idom) = block.immediate_dominator() else {
                self.report(format!("{id} has no immediate dominator"));
                continue;
            };
            reachable += 1;

            if idom == id {
                root_total += block.num_dominated();
                if !self.is_root(id) && !osr_present && !block.predecessors().is_empty() {
                    self.report(format!("{id} dominates itself but is not a root"));
                }
            } else {
                for &pred in block.predecessors() {
                    if !graph.dominates(idom, pred) {
                        self.report(format!("idom {idom} of {id} does not dominate predecessor {pred}"));
                    }
                }
                if !graph[idom].dominated().contains(&id) {
                    self.report(format!("{idom} does not list dominated child {id}"));
                }
            }

            let children: usize = block
                .dominated()
                .iter()
                .map(|&c| graph[c].num_dominated())
                .sum();
            if block.num_dominated() != children + 1 {
                self.report(format!(
                    "{id} dominates {} blocks, children account for {}",
                    block.num_dominated(),
                    children + 1
                ));
            }
            for &child in block.dominated() {
                if graph[child].immediate_dominator() != Some(id) {
                    self.report(format!("{child} is listed under {id} but has another idom"));
                }
            }
        }

        if root_total != reachable {
            self.report(format!(
                "roots dominate {root_total} blocks, {reachable} have dominators"
            ));
        }
    }

    fn check_phi_types(&mut self) {
        let graph = self.graph;
        for block in graph.blocks() {
            for &phi in block.phis() {
                let ty = graph[phi].ty();
                if !ty.is_concrete() {
                    self.report(format!("{phi} has no type"));
                    continue;
                }
                for &operand in graph[phi].operands() {
                    if graph[operand].ty() != ty {
                        self.report(format!(
                            "{phi}: {ty} has operand {operand} of type {}",
                            graph[operand].ty()
                        ));
                    }
                }
            }
        }
    }

    fn check_float32_coherency(&mut self) {
        let graph = self.graph;
        for value in graph.values().filter(|v| v.ty() == MirType::Float32) {
            for site in value.uses() {
                let UseSite::Value { consumer, index } = *site else {
                    continue;
                };
                let user = &graph[consumer];
                let coherent = user.ty() == MirType::Float32
                    || match user.op() {
                        MirOp::ToDouble
                        | MirOp::ToFloat32
                        | MirOp::ToInt32
                        | MirOp::Box
                        | MirOp::Test
                        | MirOp::Not => true,
                        MirOp::Compare { operand_type, .. } => *operand_type == MirType::Float32,
                        MirOp::StoreElement { elem_type } => {
                            *elem_type == MirType::Float32 && index == 2
                        }
                        _ => false,
                    };
                if !coherent {
                    self.report(format!(
                        "float32 {} flows into {consumer} ({}) without conversion",
                        value.id(),
                        user.op().mnemonic()
                    ));
                }
            }
        }
    }
}
