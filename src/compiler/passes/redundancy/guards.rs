//! Type-guard elimination.
//!
//! A guard rejecting `null` and/or `undefined` is redundant when a branch
//! on the way to it already excluded those values. Only branches of
//! immediate dominators count: the guard's block must be reachable only
//! through the branch's proving side.
//!
//! A branch proves something about a value `v` when its condition is:
//!
//! | Condition | Taken side | Not-taken side |
//! |-----------|------------|----------------|
//! | `v` | not null, not undefined | |
//! | `not v` | | not null, not undefined |
//! | `v !== null` / `v === null` | not null | |
//! | `v != null` / `v == null` | not null, not undefined | |
//!
//! with the last two rows mirrored for the equality operators.

use crate::{
    mir::{CompareOp, ConstValue, DefFlags, GuardFilter, MirGraph, MirOp, UnboxMode, ValueId},
    Result,
};

/// Returns the values the branch on `condition` excludes from `value` on
/// the given side.
fn excluded_by(graph: &MirGraph, condition: ValueId, value: ValueId, taken: bool) -> GuardFilter {
    if condition == value {
        return if taken {
            GuardFilter::all()
        } else {
            GuardFilter::empty()
        };
    }

    match graph[condition].op() {
        MirOp::Not if graph[condition].operand(0) == Some(value) && !taken => GuardFilter::all(),
        MirOp::Compare { op, .. } => {
            let [lhs, rhs] = graph[condition].operands()[..] else {
                return GuardFilter::empty();
            };
            let other = if lhs == value {
                rhs
            } else if rhs == value {
                lhs
            } else {
                return GuardFilter::empty();
            };
            let compared = match graph[other].op() {
                MirOp::Constant(ConstValue::Null) => GuardFilter::NULL,
                MirOp::Constant(ConstValue::Undefined) => GuardFilter::UNDEFINED,
                _ => return GuardFilter::empty(),
            };
            let (loose, inequality) = match op {
                CompareOp::StrictNe => (false, true),
                CompareOp::StrictEq => (false, false),
                CompareOp::LooseNe => (true, true),
                CompareOp::LooseEq => (true, false),
                _ => return GuardFilter::empty(),
            };
            if inequality != taken {
                return GuardFilter::empty();
            }
            // null == undefined under loose equality
            if loose {
                GuardFilter::all()
            } else {
                compared
            }
        }
        _ => GuardFilter::empty(),
    }
}

/// Returns `true` if `value`, or the boxed value it unboxes, is proven to
/// avoid every value in `filters` at the start of `block`.
fn proven_on_entry(graph: &MirGraph, guard: ValueId, value: ValueId, filters: GuardFilter) -> bool {
    let unboxed_from = match graph[value].op() {
        MirOp::Unbox { .. } => graph[value].operand(0),
        _ => None,
    };
    let mut block = graph[guard].block();
    let mut excluded = GuardFilter::empty();

    loop {
        if let Some((test, taken)) = graph.immediate_dominator_branch(block) {
            if let Some(condition) = graph[test].operand(0) {
                excluded |= excluded_by(graph, condition, value, taken);
                if let Some(boxed) = unboxed_from {
                    excluded |= excluded_by(graph, condition, boxed, taken);
                }
                if excluded.contains(filters) {
                    return true;
                }
            }
        }
        match graph[block].immediate_dominator() {
            Some(idom) if idom != block => block = idom,
            _ => return false,
        }
    }
}

/// Discards `guard` if a dominating branch makes it redundant.
///
/// Uses of the guard move to its input. If the input is an unbox behind a
/// type barrier, the proof covers the barrier's failure cases as well and
/// the unbox becomes infallible. Returns `true` if the guard was discarded.
pub(crate) fn eliminate_guard(graph: &mut MirGraph, guard: ValueId) -> Result<bool> {
    let MirOp::TypeGuard { filters } = *graph[guard].op() else {
        return Ok(false);
    };
    let Some(input) = graph[guard].operand(0) else {
        return Ok(false);
    };
    if filters.is_empty() || !proven_on_entry(graph, guard, input, filters) {
        return Ok(false);
    }

    if let MirOp::Unbox {
        target,
        mode: UnboxMode::TypeBarrier,
    } = *graph[input].op()
    {
        graph.set_op(
            input,
            MirOp::Unbox {
                target,
                mode: UnboxMode::Infallible,
            },
        );
        graph.set_flag(input, DefFlags::GUARD, false);
    }
    graph.replace_all_uses_with(guard, input)?;
    graph.discard(guard)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{passes::DominatorPass, CompileContext},
        mir::{BlockId, MirBuilder, MirType},
    };

    struct Branch {
        builder: MirBuilder,
        then_block: BlockId,
        else_block: BlockId,
        value: ValueId,
    }

    /// ```text
    ///      b0   if (cond) then b1 else b2
    ///     /  \
    ///   b1    b2
    /// ```
    fn branch_on(make_condition: impl FnOnce(&mut MirBuilder, BlockId, ValueId) -> ValueId) -> Branch {
        let mut b = MirBuilder::new("guard");
        let entry = b.entry();
        let then_block = b.block().unwrap();
        let else_block = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        let value = b.unbox(entry, p, MirType::Object, UnboxMode::TypeBarrier).unwrap();
        let condition = make_condition(&mut b, entry, value);
        b.test(entry, condition, then_block, else_block).unwrap();
        Branch {
            builder: b,
            then_block,
            else_block,
            value,
        }
    }

    fn guard_in(branch: Branch, then_side: bool, filters: GuardFilter) -> (MirGraph, ValueId, ValueId) {
        let Branch {
            mut builder,
            then_block,
            else_block,
            value,
        } = branch;
        let block = if then_side { then_block } else { else_block };
        let guard = builder.type_guard(block, value, filters).unwrap();
        let ret = builder.ret(block, guard).unwrap();
        builder.ret(if then_side { else_block } else { then_block }, value).unwrap();
        let mut graph = builder.finish();
        DominatorPass::build_dominator_tree(&mut graph, &CompileContext::default()).unwrap();
        (graph, guard, ret)
    }

    #[test]
    fn test_truthiness_proves_both() {
        let branch = branch_on(|_, _, v| v);
        let value = branch.value;
        let (mut graph, guard, ret) = guard_in(branch, true, GuardFilter::all());
        assert!(eliminate_guard(&mut graph, guard).unwrap());
        assert_eq!(graph[ret].operands(), &[value]);
        assert_eq!(
            graph[value].op(),
            &MirOp::Unbox {
                target: MirType::Object,
                mode: UnboxMode::Infallible
            }
        );
        assert!(!graph[value].has(DefFlags::GUARD));
    }

    #[test]
    fn test_falsy_side_proves_nothing() {
        let branch = branch_on(|_, _, v| v);
        let (mut graph, guard, _) = guard_in(branch, false, GuardFilter::NULL);
        assert!(!eliminate_guard(&mut graph, guard).unwrap());
        assert!(graph.contains_value(guard));
    }

    #[test]
    fn test_strict_null_comparison() {
        let ne_null = |b: &mut MirBuilder, block: BlockId, v: ValueId| {
            let null = b.null(block).unwrap();
            b.compare(block, CompareOp::StrictNe, MirType::Value, v, null).unwrap()
        };
        let (mut graph, guard, _) = guard_in(branch_on(ne_null), true, GuardFilter::NULL);
        assert!(eliminate_guard(&mut graph, guard).unwrap());

        // Strict comparison with null says nothing about undefined.
        let (mut graph, guard, _) = guard_in(branch_on(ne_null), true, GuardFilter::all());
        assert!(!eliminate_guard(&mut graph, guard).unwrap());
    }

    #[test]
    fn test_loose_equality_else_side() {
        let eq_null = |b: &mut MirBuilder, block: BlockId, v: ValueId| {
            let null = b.null(block).unwrap();
            b.compare(block, CompareOp::LooseEq, MirType::Value, null, v).unwrap()
        };
        let (mut graph, guard, _) = guard_in(branch_on(eq_null), false, GuardFilter::all());
        assert!(eliminate_guard(&mut graph, guard).unwrap());
    }

    #[test]
    fn test_not_condition() {
        let not = |b: &mut MirBuilder, block: BlockId, v: ValueId| b.not(block, v).unwrap();
        let (mut graph, guard, _) = guard_in(branch_on(not), false, GuardFilter::UNDEFINED);
        assert!(eliminate_guard(&mut graph, guard).unwrap());
    }

    #[test]
    fn test_proof_found_up_the_dominator_chain() {
        let mut b = MirBuilder::new("chain");
        let entry = b.entry();
        let then_block = b.block().unwrap();
        let else_block = b.block().unwrap();
        let inner = b.block().unwrap();
        let p = b.parameter(entry, 0).unwrap();
        b.test(entry, p, then_block, else_block).unwrap();
        b.goto(then_block, inner).unwrap();
        let guard = b.type_guard(inner, p, GuardFilter::NULL).unwrap();
        b.ret(inner, guard).unwrap();
        b.ret(else_block, p).unwrap();
        let mut graph = b.finish();
        DominatorPass::build_dominator_tree(&mut graph, &CompileContext::default()).unwrap();

        assert!(eliminate_guard(&mut graph, guard).unwrap());
        assert!(!graph.contains_value(guard));
    }
}
