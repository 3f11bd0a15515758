//! Bounds-check folding.
//!
//! A bounds check `check(i + c, len)[min..max]` succeeds when
//! `i + c + min >= 0` and `i + c + max < len`. Two checks on the same term
//! `i` and the same length differ only in their offsets, so a dominating
//! check can absorb a dominated one by widening its range:
//!
//! ```text
//! check(i, len)[0..0]          check(i, len)[0..1]
//! ...                    =>    ...
//! check(i + 1, len)[0..0]      (uses of the second check read i + 1)
//! ```
//!
//! Checks are keyed by `(term, length)` in a table filled during the
//! dominator-tree walk. An entry is valid for the walk indices of the
//! dominator subtree of its block, so a hit is always dominated by the
//! table's check.

use std::collections::{hash_map::Entry, HashMap};

use crate::{
    mir::{ArithOp, MirGraph, MirOp, MirType, ValueId},
    Result,
};

/// An int32 value decomposed as `term + constant`.
///
/// `term` is `None` for a pure constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinearSum {
    /// The non-constant part
    pub term: Option<ValueId>,
    /// The constant offset
    pub constant: i32,
}

impl LinearSum {
    /// Decomposes `value` through int32 additions and subtractions of
    /// constants. Decomposition stops where the offset would overflow.
    #[must_use]
    pub fn extract(graph: &MirGraph, value: ValueId) -> LinearSum {
        let mut current = value;
        let mut constant: i32 = 0;
        loop {
            let def = &graph[current];
            if let Some(c) = def.op().as_int32() {
                if let Some(sum) = constant.checked_add(c) {
                    return LinearSum {
                        term: None,
                        constant: sum,
                    };
                }
                break;
            }

            let MirOp::Arith {
                op,
                specialization: MirType::Int32,
            } = *def.op()
            else {
                break;
            };
            let [lhs, rhs] = def.operands()[..] else {
                break;
            };
            let lhs_const = graph[lhs].op().as_int32();
            let rhs_const = graph[rhs].op().as_int32();
            let step = match (op, lhs_const, rhs_const) {
                (ArithOp::Add, _, Some(c)) => Some((lhs, constant.checked_add(c))),
                (ArithOp::Add, Some(c), None) => Some((rhs, constant.checked_add(c))),
                (ArithOp::Sub, _, Some(c)) => Some((lhs, constant.checked_sub(c))),
                _ => None,
            };
            match step {
                Some((next, Some(offset))) => {
                    current = next;
                    constant = offset;
                }
                _ => break,
            }
        }
        LinearSum {
            term: Some(current),
            constant,
        }
    }
}

/// Returns `true` if the two bounds checks test the same term against the
/// same length, i.e. one can absorb the other.
#[must_use]
pub fn equivalent_checks(graph: &MirGraph, a: ValueId, b: ValueId) -> bool {
    let (MirOp::BoundsCheck { .. }, MirOp::BoundsCheck { .. }) = (graph[a].op(), graph[b].op()) else {
        return false;
    };
    let ([a_index, a_length], [b_index, b_length]) = (graph[a].operands(), graph[b].operands()) else {
        return false;
    };
    a_length == b_length
        && LinearSum::extract(graph, *a_index).term == LinearSum::extract(graph, *b_index).term
}

/// Returns the range `[minimum, maximum]` a bounds check enforces relative
/// to its index's term.
fn checked_range(graph: &MirGraph, check: ValueId) -> Option<(LinearSum, i32, i32)> {
    let MirOp::BoundsCheck { minimum, maximum } = *graph[check].op() else {
        return None;
    };
    let index = graph[check].operand(0)?;
    let sum = LinearSum::extract(graph, index);
    Some((sum, minimum, maximum))
}

/// Outcome of offering a check to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fold {
    /// The check is the first of its kind in scope and now heads the table
    Recorded,
    /// The check was folded into the given dominating check
    Folded(ValueId),
    /// A dominating check exists but merging the ranges overflows
    Overflow(ValueId),
}

#[derive(Debug, Clone, Copy)]
struct Dominating {
    check: ValueId,
    valid_end: usize,
}

/// Checks seen so far in the dominator-tree walk, keyed by term and length.
#[derive(Debug, Default)]
pub(crate) struct BoundsCheckTable {
    checks: HashMap<(Option<ValueId>, ValueId), Dominating>,
}

impl BoundsCheckTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Folds `check` into a dominating equivalent check if one exists, or
    /// records it as the dominating check for its subtree.
    ///
    /// `index` is the walk index of the check's block and `valid_end` the
    /// first index past its dominator subtree.
    pub(crate) fn fold(
        &mut self,
        graph: &mut MirGraph,
        check: ValueId,
        index: usize,
        valid_end: usize,
    ) -> Result<Fold> {
        let Some((sum, minimum, maximum)) = checked_range(graph, check) else {
            return Ok(Fold::Recorded);
        };
        let Some(&length) = graph[check].operands().get(1) else {
            return Ok(Fold::Recorded);
        };

        let key = (sum.term, length);
        self.checks.try_reserve(1)?;
        let dominating = match self.checks.entry(key) {
            Entry::Occupied(entry)
                if index < entry.get().valid_end
                    && graph.contains_value(entry.get().check)
                    && equivalent_checks(graph, entry.get().check, check) =>
            {
                entry.get().check
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Dominating { check, valid_end });
                return Ok(Fold::Recorded);
            }
            Entry::Vacant(entry) => {
                entry.insert(Dominating { check, valid_end });
                return Ok(Fold::Recorded);
            }
        };

        let Some((base, dom_min, dom_max)) = checked_range(graph, dominating) else {
            return Ok(Fold::Overflow(dominating));
        };
        // Rebase the dominated range onto the dominating check's index.
        let merged = sum
            .constant
            .checked_sub(base.constant)
            .and_then(|delta| Some((delta.checked_add(minimum)?, delta.checked_add(maximum)?)));
        let Some((new_min, new_max)) = merged else {
            return Ok(Fold::Overflow(dominating));
        };

        graph.set_op(
            dominating,
            MirOp::BoundsCheck {
                minimum: dom_min.min(new_min),
                maximum: dom_max.max(new_max),
            },
        );
        let Some(raw_index) = graph[check].operand(0) else {
            return Ok(Fold::Overflow(dominating));
        };
        graph.replace_all_uses_with(check, raw_index)?;
        graph.discard(check)?;
        Ok(Fold::Folded(dominating))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MirBuilder, UnboxMode};

    #[test]
    fn test_extract_offsets() {
        let mut b = MirBuilder::new("sum");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let two = b.int32(entry, 2).unwrap();
        let five = b.int32(entry, 5).unwrap();
        let plus = b.add(entry, MirType::Int32, two, i).unwrap();
        let minus = b.arith(entry, ArithOp::Sub, MirType::Int32, plus, five).unwrap();
        let doubled = b.add(entry, MirType::Double, i, two).unwrap();
        let graph = b.finish();

        assert_eq!(
            LinearSum::extract(&graph, minus),
            LinearSum {
                term: Some(i),
                constant: -3
            }
        );
        assert_eq!(
            LinearSum::extract(&graph, five),
            LinearSum {
                term: None,
                constant: 5
            }
        );
        assert_eq!(LinearSum::extract(&graph, doubled).term, Some(doubled));
    }

    #[test]
    fn test_extract_stops_on_overflow() {
        let mut b = MirBuilder::new("overflow");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let max = b.int32(entry, i32::MAX).unwrap();
        let first = b.add(entry, MirType::Int32, i, max).unwrap();
        let second = b.add(entry, MirType::Int32, first, max).unwrap();
        let graph = b.finish();

        assert_eq!(
            LinearSum::extract(&graph, second),
            LinearSum {
                term: Some(first),
                constant: i32::MAX
            }
        );
    }

    #[test]
    fn test_fold_widens_dominating_range() {
        let mut b = MirBuilder::new("fold");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let array = b.unbox(entry, p, MirType::Object, UnboxMode::Fallible).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let len = b.array_length(entry, array).unwrap();
        let one = b.int32(entry, 1).unwrap();
        let next = b.add(entry, MirType::Int32, i, one).unwrap();
        let first = b.bounds_check(entry, i, len).unwrap();
        let second = b.bounds_check(entry, next, len).unwrap();
        let load = b.load_element(entry, array, second, MirType::Int32).unwrap();
        let mut graph = b.finish();

        let mut table = BoundsCheckTable::new();
        assert_eq!(table.fold(&mut graph, first, 0, 1).unwrap(), Fold::Recorded);
        assert_eq!(table.fold(&mut graph, second, 0, 1).unwrap(), Fold::Folded(first));
        assert_eq!(
            graph[first].op(),
            &MirOp::BoundsCheck {
                minimum: 0,
                maximum: 1
            }
        );
        assert!(!graph.contains_value(second));
        assert_eq!(graph[load].operands()[1], next);
    }

    #[test]
    fn test_out_of_scope_check_replaces_entry() {
        let mut b = MirBuilder::new("scope");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let first = b.bounds_check(entry, i, i).unwrap();
        let second = b.bounds_check(entry, i, i).unwrap();
        let mut graph = b.finish();

        let mut table = BoundsCheckTable::new();
        table.fold(&mut graph, first, 1, 2).unwrap();
        // A sibling subtree starts past the recorded one.
        assert_eq!(table.fold(&mut graph, second, 2, 3).unwrap(), Fold::Recorded);
        assert!(graph.contains_value(first));
        assert!(graph.contains_value(second));
    }

    #[test]
    fn test_overflowing_merge_keeps_both() {
        let mut b = MirBuilder::new("wide");
        let entry = b.entry();
        let p = b.parameter(entry, 0).unwrap();
        let i = b.unbox(entry, p, MirType::Int32, UnboxMode::Fallible).unwrap();
        let len = b.array_length(entry, p).unwrap();
        let min = b.int32(entry, i32::MIN).unwrap();
        let shifted = b.add(entry, MirType::Int32, i, min).unwrap();
        let first = b.bounds_check(entry, shifted, len).unwrap();
        let wide = MirOp::BoundsCheck {
            minimum: 0,
            maximum: i32::MAX,
        };
        let second = b.op(entry, wide.clone(), &[i, len]).unwrap();
        let mut graph = b.finish();

        let mut table = BoundsCheckTable::new();
        table.fold(&mut graph, first, 0, 1).unwrap();
        assert_eq!(table.fold(&mut graph, second, 0, 1).unwrap(), Fold::Overflow(first));
        assert!(graph.contains_value(second));
        assert_eq!(graph[second].op(), &wide);
    }
}
