//! Per-instruction type policies.
//!
//! Once phi types are fixed, every instruction checks that its operands
//! have the representation it expects and inserts conversions in front of
//! itself where they do not. The expected representation of each operand is
//! decided by [`required_type`], one `match` arm per operation kind.
//!
//! Conversions are chosen by [`convert`]:
//!
//! | From \ To          | `Value` | `Int32`   | `Double`           | `Float32`                  | other       |
//! |--------------------|---------|-----------|--------------------|----------------------------|-------------|
//! | `Int32`, `Float32` | box     | `ToInt32` | `ToDouble`         | `ToFloat32`                | box + unbox |
//! | `Double`           | box     | `ToInt32` | -                  | `ToFloat32`                | box + unbox |
//! | `Value`            | -       | `ToInt32` | unbox              | unbox double + `ToFloat32` | unbox       |
//! | anything else      | box     | box + `ToInt32` | box + unbox  | box + unbox + `ToFloat32`  | box + unbox |
//!
//! Unboxes are fallible: a mismatch at run time bails out. A box whose
//! input already has the target type is looked through instead of being
//! unboxed, and boxing an unbox reuses the unbox's input.

use crate::{
    compiler::{CompileContext, EventKind},
    mir::{BlockId, MirGraph, MirOp, MirType, UnboxMode, ValueId},
    Result,
};

/// Where conversions are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertPoint {
    /// Immediately before an instruction
    Before(ValueId),
    /// Before the terminator of a block, i.e. on its outgoing edge
    EndOf(BlockId),
}

/// Returns the representation operand `index` of `op` must have, or `None`
/// if the operation accepts any.
#[must_use]
pub fn required_type(op: &MirOp, index: usize, operand_type: MirType) -> Option<MirType> {
    match op {
        MirOp::Arith { specialization, .. } => Some(match specialization {
            MirType::Int32 | MirType::Double | MirType::Float32 => *specialization,
            _ => MirType::Value,
        }),
        MirOp::Compare { operand_type: compared, .. } => Some(if compared.is_concrete() {
            *compared
        } else {
            MirType::Value
        }),
        MirOp::Unbox { .. } | MirOp::Call | MirOp::Return => Some(MirType::Value),
        MirOp::ToDouble | MirOp::ToFloat32 | MirOp::ToInt32 => {
            (!operand_type.is_numeric()).then_some(MirType::Value)
        }
        MirOp::ArrayLength => Some(MirType::Object),
        MirOp::LoadElement { .. } => Some(if index == 0 {
            MirType::Object
        } else {
            MirType::Int32
        }),
        MirOp::StoreElement { elem_type } => Some(match index {
            0 => MirType::Object,
            1 => MirType::Int32,
            _ if elem_type.is_concrete() => *elem_type,
            _ => MirType::Value,
        }),
        MirOp::BoundsCheck { .. } => Some(MirType::Int32),
        MirOp::Phi
        | MirOp::Parameter(_)
        | MirOp::Constant(_)
        | MirOp::Not
        | MirOp::Box
        | MirOp::TypeGuard { .. }
        | MirOp::Test
        | MirOp::Goto => None,
    }
}

/// Applies the policy of `ins` to each of its operands.
///
/// Returns the number of operands that were rewired.
pub(crate) fn adjust_inputs(graph: &mut MirGraph, ctx: &CompileContext, ins: ValueId) -> Result<usize> {
    let mut adjusted = 0;
    for index in 0..graph[ins].operands().len() {
        let input = graph[ins].operands()[index];
        let Some(target) = required_type(graph[ins].op(), index, graph[input].ty()) else {
            continue;
        };
        if let Some(converted) = convert(graph, InsertPoint::Before(ins), input, target)? {
            graph.set_operand(ins, index, converted)?;
            record_conversion(graph, ctx, ins, index, converted);
            adjusted += 1;
        }
    }
    Ok(adjusted)
}

pub(crate) fn record_conversion(
    graph: &MirGraph,
    ctx: &CompileContext,
    consumer: ValueId,
    index: usize,
    converted: ValueId,
) {
    ctx.events
        .record(EventKind::ConversionInserted)
        .unit(graph.name())
        .block(graph[consumer].block())
        .value(consumer)
        .message(format!(
            "{consumer} operand {index} now {converted} ({}: {})",
            graph[converted].op().mnemonic(),
            graph[converted].ty()
        ));
}

/// Produces a `target`-typed version of `input`, emitting conversions at
/// `at`. Returns `None` if `input` already has the right type.
pub(crate) fn convert(
    graph: &mut MirGraph,
    at: InsertPoint,
    input: ValueId,
    target: MirType,
) -> Result<Option<ValueId>> {
    let from = graph[input].ty();
    if from == target || matches!(target, MirType::None | MirType::OptimizedOut) {
        return Ok(None);
    }
    if let Some(inner) = boxed_input_of_type(graph, input, target) {
        return Ok(Some(inner));
    }

    let converted = match target {
        MirType::Value => box_value(graph, at, input)?,
        MirType::Int32 => {
            let source = if from.is_numeric() || from == MirType::Value {
                input
            } else {
                box_value(graph, at, input)?
            };
            emit(graph, at, MirOp::ToInt32, source)?
        }
        MirType::Double if from.converts_to_double() => emit(graph, at, MirOp::ToDouble, input)?,
        MirType::Float32 if matches!(from, MirType::Int32 | MirType::Double) => {
            emit(graph, at, MirOp::ToFloat32, input)?
        }
        MirType::Float32 => {
            let unboxed = unbox(graph, at, input, MirType::Double)?;
            emit(graph, at, MirOp::ToFloat32, unboxed)?
        }
        _ => unbox(graph, at, input, target)?,
    };
    Ok(Some(converted))
}

fn emit(graph: &mut MirGraph, at: InsertPoint, op: MirOp, input: ValueId) -> Result<ValueId> {
    match at {
        InsertPoint::Before(anchor) => graph.insert_before(anchor, op, &[input]),
        InsertPoint::EndOf(block) => graph.insert_before_terminator(block, op, &[input]),
    }
}

fn box_value(graph: &mut MirGraph, at: InsertPoint, input: ValueId) -> Result<ValueId> {
    if let MirOp::Unbox { .. } = graph[input].op() {
        if let Some(boxed) = graph[input].operand(0) {
            if graph[boxed].ty() == MirType::Value {
                return Ok(boxed);
            }
        }
    }
    emit(graph, at, MirOp::Box, input)
}

fn unbox(graph: &mut MirGraph, at: InsertPoint, input: ValueId, target: MirType) -> Result<ValueId> {
    if let Some(inner) = boxed_input_of_type(graph, input, target) {
        return Ok(inner);
    }
    let boxed = if graph[input].ty() == MirType::Value {
        input
    } else {
        box_value(graph, at, input)?
    };
    let op = MirOp::Unbox {
        target,
        mode: UnboxMode::Fallible,
    };
    emit(graph, at, op, boxed)
}

/// Returns the input of a `Box` when it already has type `target`.
fn boxed_input_of_type(graph: &MirGraph, value: ValueId, target: MirType) -> Option<ValueId> {
    if !matches!(graph[value].op(), MirOp::Box) {
        return None;
    }
    let inner = graph[value].operand(0)?;
    (graph[inner].ty() == target).then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{CompareOp, MirBuilder};

    fn ctx() -> CompileContext {
        CompileContext::default()
    }

    #[test]
    fn test_int32_arith_accepts_int32() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let one = b.int32(entry, 1).unwrap();
        let sum = b.add(entry, MirType::Int32, one, one).unwrap();
        let mut graph = b.finish();
        assert_eq!(adjust_inputs(&mut graph, &ctx(), sum).unwrap(), 0);
    }

    #[test]
    fn test_double_arith_converts_int32() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let one = b.int32(entry, 1).unwrap();
        let half = b.double(entry, 0.5).unwrap();
        let sum = b.add(entry, MirType::Double, one, half).unwrap();
        let mut graph = b.finish();

        assert_eq!(adjust_inputs(&mut graph, &ctx(), sum).unwrap(), 1);
        let converted = graph[sum].operands()[0];
        assert_eq!(graph[converted].op(), &MirOp::ToDouble);
        assert_eq!(graph[converted].operands(), &[one]);
        assert_eq!(graph.position_in_block(converted), Some(2));
    }

    #[test]
    fn test_value_input_unboxed_fallibly() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let len = b.array_length(entry, p).unwrap();
        let mut graph = b.finish();

        let context = ctx();
        assert_eq!(adjust_inputs(&mut graph, &context, len).unwrap(), 1);
        let unboxed = graph[len].operands()[0];
        assert_eq!(
            graph[unboxed].op(),
            &MirOp::Unbox {
                target: MirType::Object,
                mode: UnboxMode::Fallible
            }
        );
        assert_eq!(context.events.count_kind(EventKind::ConversionInserted), 1);
    }

    #[test]
    fn test_return_boxes_and_looks_through_unbox() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let n = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let ret = b.ret(entry, n).unwrap();
        let mut graph = b.finish();

        assert_eq!(adjust_inputs(&mut graph, &ctx(), ret).unwrap(), 1);
        assert_eq!(graph[ret].operands(), &[p]);
    }

    #[test]
    fn test_box_of_target_type_is_looked_through() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let one = b.int32(entry, 1).unwrap();
        let boxed = b.box_value(entry, one).unwrap();
        let sum = b.add(entry, MirType::Int32, boxed, one).unwrap();
        let mut graph = b.finish();

        assert_eq!(adjust_inputs(&mut graph, &ctx(), sum).unwrap(), 1);
        assert_eq!(graph[sum].operands(), &[one, one]);
    }

    #[test]
    fn test_boolean_to_double_goes_through_box() {
        let mut b = MirBuilder::new("t");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let flag = b.not(entry, p).unwrap();
        let zero = b.double(entry, 0.0).unwrap();
        let cmp = b.compare(entry, CompareOp::Lt, MirType::Double, flag, zero).unwrap();
        let mut graph = b.finish();

        assert_eq!(adjust_inputs(&mut graph, &ctx(), cmp).unwrap(), 1);
        let unboxed = graph[cmp].operands()[0];
        let boxed = graph[unboxed].operands()[0];
        assert_eq!(graph[boxed].op(), &MirOp::Box);
        assert_eq!(graph[boxed].operands(), &[flag]);
        assert_eq!(graph[unboxed].ty(), MirType::Double);
    }

    #[test]
    fn test_required_types() {
        let store = MirOp::StoreElement {
            elem_type: MirType::Float32,
        };
        assert_eq!(required_type(&store, 0, MirType::Value), Some(MirType::Object));
        assert_eq!(required_type(&store, 1, MirType::Double), Some(MirType::Int32));
        assert_eq!(required_type(&store, 2, MirType::Double), Some(MirType::Float32));
        assert_eq!(required_type(&MirOp::ToInt32, 0, MirType::Double), None);
        assert_eq!(required_type(&MirOp::ToInt32, 0, MirType::String), Some(MirType::Value));
        assert_eq!(required_type(&MirOp::Test, 0, MirType::String), None);
    }
}
