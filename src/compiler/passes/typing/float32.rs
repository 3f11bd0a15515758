//! The reduced-precision float32 lane.
//!
//! Float32 arithmetic only pays off when a whole neighbourhood of the graph
//! stays in float32; a single float32 operation wedged between double
//! producers and consumers costs two conversions and gains nothing.
//! The lane therefore classifies before it rewrites.
//!
//! Candidates are double phis and double arithmetic marked float32
//! commutative. Every candidate starts out flagged as both producer and
//! consumer, and a worklist retracts flags until the region is stable:
//!
//! - **Producer**: every operand is float32, a constant float32 can hold
//!   exactly, or a candidate still inside the region.
//! - **Consumer**: every use is a snapshot, a candidate still inside the
//!   region, or an instruction outside the candidate set that accepts a
//!   float32 input. A candidate that fell out of the region stays double
//!   and so never counts as a consumer.
//!
//! Candidates left with both flags are retyped to float32. Mismatches at
//! the edges of the region are fixed up by the operand policies, which
//! insert `ToFloat32` going in and `ToDouble` coming out.

use tracing::trace;

use crate::{
    compiler::{CompileContext, EventKind},
    mir::{DefFlags, MirGraph, MirOp, MirType, UseSite, ValueId},
    utils::Worklist,
    Result,
};

const REGION: DefFlags = DefFlags::CAN_PRODUCE_FLOAT32.union(DefFlags::CAN_CONSUME_FLOAT32);

/// Returns `true` if `value` is float32 or can become float32 without
/// losing precision.
pub(crate) fn can_produce_float32(graph: &MirGraph, value: ValueId) -> bool {
    let def = &graph[value];
    match def.op() {
        MirOp::Constant(constant) => constant.is_float32_representable(),
        _ => def.ty() == MirType::Float32,
    }
}

/// Returns `true` if operand `index` of `consumer` accepts a float32 input
/// without being retyped itself.
pub(crate) fn can_consume_float32(graph: &MirGraph, consumer: ValueId, index: usize) -> bool {
    let def = &graph[consumer];
    if def.ty() == MirType::Float32 {
        return true;
    }
    match def.op() {
        MirOp::ToDouble
        | MirOp::ToFloat32
        | MirOp::ToInt32
        | MirOp::Box
        | MirOp::Test
        | MirOp::Not => true,
        MirOp::Compare { operand_type, .. } => *operand_type == MirType::Float32,
        MirOp::StoreElement { elem_type } => index == 2 && *elem_type == MirType::Float32,
        _ => false,
    }
}

/// Returns `true` if `value` may be retyped to float32 by the lane.
fn is_candidate(graph: &MirGraph, value: ValueId) -> bool {
    let def = &graph[value];
    if def.ty() != MirType::Double {
        return false;
    }
    match def.op() {
        MirOp::Phi => true,
        MirOp::Arith { specialization, .. } => {
            *specialization == MirType::Double && def.op().is_float32_commutative()
        }
        _ => false,
    }
}

fn in_region(graph: &MirGraph, value: ValueId) -> bool {
    graph[value].has(REGION)
}

fn operands_produce(graph: &MirGraph, value: ValueId) -> bool {
    graph[value]
        .operands()
        .iter()
        .all(|&operand| in_region(graph, operand) || can_produce_float32(graph, operand))
}

fn uses_consume(graph: &MirGraph, value: ValueId) -> bool {
    graph[value].uses().iter().all(|site| match *site {
        UseSite::Value { consumer, index } => {
            if is_candidate(graph, consumer) {
                in_region(graph, consumer)
            } else {
                can_consume_float32(graph, consumer, index)
            }
        }
        UseSite::Snapshot { .. } => true,
    })
}

fn candidates(graph: &MirGraph) -> Vec<ValueId> {
    let mut found = Vec::new();
    for block in graph.reverse_postorder() {
        let def = &graph[block];
        for &value in def.phis().iter().chain(def.instructions()) {
            if is_candidate(graph, value) {
                found.push(value);
            }
        }
    }
    found
}

/// Flags the float32 region: candidates keep both flags only while all of
/// their operands produce and all of their uses consume float32.
pub(crate) fn mark_float32_region(graph: &mut MirGraph, ctx: &CompileContext) -> Result<Vec<ValueId>> {
    let candidates = candidates(graph);
    let mut worklist: Worklist<ValueId> = Worklist::with_capacity(graph.value_capacity());
    for &value in candidates.iter().rev() {
        graph.set_flag(value, REGION, true);
        worklist.push(value)?;
    }

    while let Some(value) = worklist.pop() {
        ctx.check_cancelled("typing")?;
        if !in_region(graph, value) {
            continue;
        }
        let produces = operands_produce(graph, value);
        let consumes = uses_consume(graph, value);
        if produces && consumes {
            continue;
        }
        graph.set_flag(value, DefFlags::CAN_PRODUCE_FLOAT32, produces);
        graph.set_flag(value, DefFlags::CAN_CONSUME_FLOAT32, consumes);

        // Neighbours inside the region were counting on this one.
        let def = &graph[value];
        let neighbours: Vec<ValueId> = def
            .operands()
            .iter()
            .copied()
            .chain(def.uses().iter().filter_map(UseSite::consumer))
            .filter(|&other| in_region(graph, other))
            .collect();
        for other in neighbours {
            worklist.push(other)?;
        }
    }
    Ok(candidates)
}

/// Retypes every candidate left inside the float32 region and clears the
/// flags of the rest. Returns the number of definitions retyped.
pub(crate) fn specialize_valid_float_ops(
    graph: &mut MirGraph,
    ctx: &CompileContext,
    candidates: &[ValueId],
) -> Result<usize> {
    let mut specialized = 0;
    for &value in candidates {
        ctx.check_cancelled("typing")?;
        if !in_region(graph, value) {
            graph.set_flag(value, REGION, false);
            continue;
        }
        if let MirOp::Arith { op, .. } = *graph[value].op() {
            graph.set_op(
                value,
                MirOp::Arith {
                    op,
                    specialization: MirType::Float32,
                },
            );
        }
        graph.set_type(value, MirType::Float32);
        record(graph, ctx, value);
        specialized += 1;
    }
    Ok(specialized)
}

/// Runs the whole lane. Returns the number of definitions retyped.
pub(crate) fn specialize_float32(graph: &mut MirGraph, ctx: &CompileContext) -> Result<usize> {
    let candidates = mark_float32_region(graph, ctx)?;
    let specialized = specialize_valid_float_ops(graph, ctx, &candidates)?;
    trace!(
        unit = graph.name(),
        candidates = candidates.len(),
        specialized,
        "float32 lane"
    );
    Ok(specialized)
}

fn record(graph: &MirGraph, ctx: &CompileContext, value: ValueId) {
    ctx.events
        .record(EventKind::Float32Specialized)
        .unit(graph.name())
        .block(graph[value].block())
        .value(value)
        .message(format!("{value} ({}) now float32", graph[value].op().mnemonic()));
}
