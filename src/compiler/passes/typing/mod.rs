//! Type specialization.
//!
//! Phis are born untyped. This pass assigns each one a representation and
//! then makes every instruction agree with the representations of its
//! operands.
//!
//! # Phi lattice
//!
//! ```text
//!              value
//!     /    /    |     \       \
//! boolean string object double  ...
//!                        /   \
//!                    int32  float32
//!                       \    /
//!                        none
//! ```
//!
//! A phi's first guess joins the types of its informative operands: non-phi
//! operands, and phi operands that were already guessed. Operands typed
//! `value` that type feedback never saw executing are ignored. Int32,
//! double and float32 join to double; any other disagreement joins to
//! value. Each guess is then pushed into the phis consuming it, which widen
//! and are requeued until nothing changes. The lattice has height three,
//! so every phi changes at most three times.
//!
//! # Rewrites
//!
//! - Phis typed `undefined`, `null` or `optimized-out` carry no
//!   information and are replaced by a constant.
//! - The float32 lane (see [`float32`]) may narrow double phis and
//!   arithmetic to float32.
//! - Phi inputs of the wrong representation are converted on their
//!   incoming edge, just before the predecessor's terminator. Value phis
//!   box their typed inputs.
//! - Every instruction then applies its operand policy (see [`policy`]).
//!
//! Afterwards [`GraphProperties::TYPES_SPECIALIZED`] holds. Running the pass
//! again on its own output changes nothing.

mod float32;
mod policy;

pub use policy::required_type;

use tracing::debug;

use crate::{
    compiler::{CompileContext, EventKind, MirPass, TypeOracle},
    mir::{ConstValue, DefFlags, GraphProperties, MirGraph, MirOp, MirType, ValueId},
    utils::Worklist,
    Result,
};

use policy::InsertPoint;

/// Counters reported by one run of the type specializer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TypingStats {
    /// Phis whose type differs from the previous run
    pub retyped_phis: usize,
    /// Singleton phis replaced by a constant
    pub replaced_phis: usize,
    /// Conversions inserted in front of phis and instructions
    pub conversions: usize,
    /// Definitions narrowed to float32
    pub float32: usize,
}

impl TypingStats {
    /// Returns `true` if the run modified the graph.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.retyped_phis + self.replaced_phis + self.conversions + self.float32 > 0
    }
}

/// Specializes phi types and inserts the conversions they imply.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSpecializationPass;

impl TypeSpecializationPass {
    /// Specializes every phi of `graph` and adjusts instruction operands.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled),
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory), or
    /// [`Error::GraphError`](crate::Error::GraphError) if the graph is
    /// inconsistent.
    pub fn specialize_types(graph: &mut MirGraph, ctx: &CompileContext) -> Result<TypingStats> {
        let mut stats = TypingStats::default();

        let phis: Vec<ValueId> = graph
            .postorder()
            .into_iter()
            .flat_map(|block| graph[block].phis().to_vec())
            .collect();
        let previous: Vec<MirType> = phis.iter().map(|&phi| graph[phi].ty()).collect();

        Self::specialize_phis(graph, ctx, &phis)?;
        for (&phi, &before) in phis.iter().zip(&previous) {
            let ty = graph[phi].ty();
            if ty != before {
                stats.retyped_phis += 1;
                ctx.events
                    .record(EventKind::PhiSpecialized)
                    .unit(graph.name())
                    .block(graph[phi].block())
                    .value(phi)
                    .message(format!("{phi}: {ty}"));
            }
        }

        stats.replaced_phis = Self::replace_singleton_phis(graph, ctx, &phis)?;

        if ctx.config().enable_float32 && graph.contains_float32() {
            stats.float32 = float32::specialize_float32(graph, ctx)?;
        }

        for &phi in &phis {
            if graph.contains_value(phi) {
                stats.conversions += Self::adjust_phi_inputs(graph, ctx, phi)?;
            }
        }

        for block in graph.reverse_postorder() {
            ctx.check_cancelled("typing")?;
            for ins in graph[block].instructions().to_vec() {
                stats.conversions += policy::adjust_inputs(graph, ctx, ins)?;
            }
        }

        graph.set_property(GraphProperties::TYPES_SPECIALIZED, true);
        Ok(stats)
    }

    fn specialize_phis(graph: &mut MirGraph, ctx: &CompileContext, phis: &[ValueId]) -> Result<()> {
        for &phi in phis {
            graph.set_type(phi, MirType::None);
            graph.set_flag(phi, DefFlags::SPECIALIZATION_TRIED, false);
        }

        let mut worklist: Worklist<ValueId> = Worklist::with_capacity(graph.value_capacity());
        let mut with_empty_inputs: Vec<ValueId> = Vec::new();

        for &phi in phis {
            ctx.check_cancelled("typing")?;
            let (ty, has_empty_inputs) = guess_phi_type(graph, ctx.oracle(), phi);
            graph.set_type(phi, ty);
            graph.set_flag(phi, DefFlags::SPECIALIZATION_TRIED, true);
            if ty == MirType::None {
                if has_empty_inputs {
                    with_empty_inputs.try_reserve(1)?;
                    with_empty_inputs.push(phi);
                }
                continue;
            }
            propagate_specialization(graph, phi, &mut worklist)?;
        }

        loop {
            while let Some(phi) = worklist.pop() {
                ctx.check_cancelled("typing")?;
                propagate_specialization(graph, phi, &mut worklist)?;
            }

            // Phis fed only by never-executed code or by other such phis.
            let mut progressed = false;
            for &phi in &with_empty_inputs {
                if graph[phi].ty() == MirType::None {
                    graph.set_type(phi, MirType::Value);
                    propagate_specialization(graph, phi, &mut worklist)?;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        // Phi cycles without any informative input.
        for &phi in phis {
            if graph[phi].ty() == MirType::None {
                graph.set_type(phi, MirType::Value);
            }
        }
        Ok(())
    }

    fn replace_singleton_phis(graph: &mut MirGraph, ctx: &CompileContext, phis: &[ValueId]) -> Result<usize> {
        let mut replaced = 0;
        for &phi in phis {
            let ty = graph[phi].ty();
            let Some(constant) = ConstValue::for_singleton(ty) else {
                continue;
            };
            let block = graph[phi].block();
            let replacement = match constant {
                ConstValue::OptimizedOut => graph.optimized_out(block)?,
                _ => graph.insert_at_start(block, MirOp::Constant(constant), &[])?,
            };
            graph.replace_all_uses_with(phi, replacement)?;
            graph.discard(phi)?;
            replaced += 1;
            ctx.events
                .record(EventKind::PhiRemoved)
                .unit(graph.name())
                .block(block)
                .value(phi)
                .message(format!("{phi} is always {ty}"));
        }
        Ok(replaced)
    }

    fn adjust_phi_inputs(graph: &mut MirGraph, ctx: &CompileContext, phi: ValueId) -> Result<usize> {
        let ty = graph[phi].ty();
        let block = graph[phi].block();
        let predecessors = graph[block].predecessors().to_vec();
        let mut converted = 0;

        for (index, &pred) in predecessors.iter().enumerate() {
            let Some(input) = graph[phi].operand(index) else {
                continue;
            };
            if graph[input].ty() == ty {
                continue;
            }
            if let Some(conversion) = policy::convert(graph, InsertPoint::EndOf(pred), input, ty)? {
                graph.set_operand(phi, index, conversion)?;
                policy::record_conversion(graph, ctx, phi, index, conversion);
                converted += 1;
            }
        }
        Ok(converted)
    }
}

/// Guesses a phi's type from its informative operands.
///
/// Returns the guess and whether an operand was skipped for lack of type
/// feedback.
fn guess_phi_type(graph: &MirGraph, oracle: &dyn TypeOracle, phi: ValueId) -> (MirType, bool) {
    let mut ty = MirType::None;
    let mut has_phi_inputs = false;
    let mut has_empty_inputs = false;

    for &input in graph[phi].operands() {
        let def = &graph[input];
        if def.is_phi() {
            has_phi_inputs = true;
            if !def.has(DefFlags::SPECIALIZATION_TRIED) || def.ty() == MirType::None {
                continue;
            }
        } else if def.ty() == MirType::Value && oracle.observed_types(input).is_empty() {
            has_empty_inputs = true;
            continue;
        }

        let input_ty = def.ty();
        if input_ty == MirType::None || input_ty == ty {
            continue;
        }
        if ty == MirType::None {
            ty = input_ty;
        } else if ty.is_representable_as_double() && input_ty.is_representable_as_double() {
            ty = MirType::Double;
        } else {
            return (MirType::Value, has_empty_inputs);
        }
    }

    if ty == MirType::None && !has_phi_inputs {
        // Every input was skipped; nothing better than value is knowable.
        ty = MirType::Value;
    }
    (ty, has_empty_inputs)
}

/// Widens the phis consuming `phi` so they can hold its type.
fn propagate_specialization(graph: &mut MirGraph, phi: ValueId, worklist: &mut Worklist<ValueId>) -> Result<()> {
    let ty = graph[phi].ty();
    let consumers: Vec<ValueId> = graph[phi]
        .uses()
        .iter()
        .filter_map(|site| site.consumer())
        .filter(|&consumer| consumer != phi && graph[consumer].is_phi())
        .collect();

    for consumer in consumers {
        if !graph[consumer].has(DefFlags::SPECIALIZATION_TRIED) {
            continue;
        }
        let current = graph[consumer].ty();
        let widened = if current == MirType::None {
            ty
        } else if current.is_representable_as_double() && ty.is_representable_as_double() {
            if current == ty {
                current
            } else {
                MirType::Double
            }
        } else if current == ty {
            current
        } else {
            MirType::Value
        };
        if widened != current {
            graph.set_type(consumer, widened);
            worklist.push(consumer)?;
        }
    }
    Ok(())
}

impl MirPass for TypeSpecializationPass {
    fn name(&self) -> &'static str {
        "typing"
    }

    fn description(&self) -> &'static str {
        "Phi type specialization and operand conversion"
    }

    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool> {
        let stats = Self::specialize_types(graph, ctx)?;
        debug!(
            unit = graph.name(),
            retyped = stats.retyped_phis,
            replaced = stats.replaced_phis,
            conversions = stats.conversions,
            float32 = stats.float32,
            "types specialized"
        );
        Ok(stats.changed())
    }
}
