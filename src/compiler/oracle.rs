//! Type feedback consumed by the type specializer.
//!
//! The runtime records which types each bytecode value produced while the
//! unit ran in a lower tier. The pipeline only reads that information
//! through [`TypeOracle`]; it never mutates it.

use std::collections::HashMap;

use crate::mir::{MirType, TypeSet, ValueId};

/// Read-only access to observed runtime types.
///
/// Implementations must be shareable across the rayon workers of
/// [`PassPipeline::run_all`](crate::PassPipeline::run_all).
pub trait TypeOracle: Send + Sync {
    /// Returns every runtime type observed for `value`.
    ///
    /// An empty set means the value never executed, so its static type
    /// carries no information for specialization.
    fn observed_types(&self, value: ValueId) -> TypeSet;

    /// Returns `true` if `value` has been observed with type `ty`.
    fn has_seen(&self, value: ValueId, ty: MirType) -> bool {
        self.observed_types(value).has_seen(ty)
    }
}

/// Oracle for units compiled without feedback: every type counts as seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl TypeOracle for NoFeedback {
    fn observed_types(&self, _value: ValueId) -> TypeSet {
        TypeSet::all()
    }
}

/// Map-backed oracle. Values without an entry count as fully observed.
#[derive(Debug, Clone, Default)]
pub struct ObservedTypes {
    observed: HashMap<ValueId, TypeSet>,
}

impl ObservedTypes {
    /// Creates an oracle without observations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the observed types of `value`, replacing earlier ones.
    pub fn observe(&mut self, value: ValueId, types: TypeSet) {
        self.observed.insert(value, types);
    }

    /// Records that `value` never executed.
    pub fn never_executed(&mut self, value: ValueId) {
        self.observe(value, TypeSet::empty());
    }
}

impl TypeOracle for ObservedTypes {
    fn observed_types(&self, value: ValueId) -> TypeSet {
        self.observed.get(&value).copied().unwrap_or(TypeSet::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_feedback_sees_everything() {
        let oracle = NoFeedback;
        assert!(oracle.has_seen(ValueId::new(0), MirType::Int32));
        assert!(!oracle.observed_types(ValueId::new(0)).is_empty());
    }

    #[test]
    fn test_observed_types() {
        let mut oracle = ObservedTypes::new();
        let v = ValueId::new(3);
        oracle.observe(v, TypeSet::INT32 | TypeSet::DOUBLE);
        assert!(oracle.has_seen(v, MirType::Double));
        assert!(oracle.has_seen(v, MirType::Float32));
        assert!(!oracle.has_seen(v, MirType::Object));

        oracle.never_executed(v);
        assert!(oracle.observed_types(v).is_empty());
        assert!(!oracle.observed_types(ValueId::new(4)).is_empty());
    }
}
