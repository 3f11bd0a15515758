//! The value type lattice of the IR.
//!
//! Every definition carries a [`MirType`]. Instructions are typed by the
//! frontend; phis start at [`MirType::None`] and are assigned a type by the
//! type specializer. [`MirType::Value`] is the untyped boxed representation
//! that every other type can be boxed into.
//!
//! The numeric part of the lattice orders `Int32 ⊑ Double`, with `Float32` as a
//! reduced-precision lane that joins with `Double` only through explicit
//! conversions at phi inputs.
//!
//! [`TypeSet`] is the runtime side: the set of types type feedback has
//! observed for a value.

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter};

/// A value representation in the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum MirType {
    /// No type yet. Unspecialized phis and definitions that produce nothing.
    None,
    /// The `undefined` singleton.
    Undefined,
    /// The `null` singleton.
    Null,
    /// An unboxed boolean.
    Boolean,
    /// An unboxed 32-bit integer.
    Int32,
    /// An unboxed 64-bit float.
    Double,
    /// An unboxed 32-bit float (reduced-precision lane).
    Float32,
    /// A string reference.
    String,
    /// A symbol reference.
    Symbol,
    /// An object reference.
    Object,
    /// Marker for a value the optimizer proved unobservable.
    #[strum(to_string = "optimized-out")]
    OptimizedOut,
    /// A boxed value of any type.
    Value,
}

impl MirType {
    /// Returns `true` for the three numeric representations.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, MirType::Int32 | MirType::Double | MirType::Float32)
    }

    /// Returns `true` if a value of this type can be widened to `Double`
    /// without changing its numeric value.
    #[must_use]
    pub const fn is_representable_as_double(self) -> bool {
        self.is_numeric()
    }

    /// Returns `true` for types that a `ToDouble` converts when feeding a
    /// `Double` phi.
    #[must_use]
    pub const fn converts_to_double(self) -> bool {
        matches!(self, MirType::Int32 | MirType::Float32)
    }

    /// Returns `true` for the singleton types whose phis collapse to a constant.
    #[must_use]
    pub const fn is_singleton(self) -> bool {
        matches!(
            self,
            MirType::Undefined | MirType::Null | MirType::OptimizedOut
        )
    }

    /// Returns `true` if the type has a concrete machine representation.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, MirType::None)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Runtime types observed for a value by type feedback.
    pub struct TypeSet: u16 {
        /// `undefined` was seen
        const UNDEFINED = 0x0001;
        /// `null` was seen
        const NULL = 0x0002;
        /// A boolean was seen
        const BOOLEAN = 0x0004;
        /// An int32 was seen
        const INT32 = 0x0008;
        /// A non-int32 number was seen
        const DOUBLE = 0x0010;
        /// A string was seen
        const STRING = 0x0020;
        /// A symbol was seen
        const SYMBOL = 0x0040;
        /// An object was seen
        const OBJECT = 0x0080;
    }
}

impl TypeSet {
    /// Returns the observation corresponding to an IR type.
    ///
    /// `Float32` maps to `DOUBLE` since the runtime has no float32 values;
    /// `Value` maps to every bit.
    #[must_use]
    pub const fn of(ty: MirType) -> TypeSet {
        match ty {
            MirType::Undefined => TypeSet::UNDEFINED,
            MirType::Null => TypeSet::NULL,
            MirType::Boolean => TypeSet::BOOLEAN,
            MirType::Int32 => TypeSet::INT32,
            MirType::Double | MirType::Float32 => TypeSet::DOUBLE,
            MirType::String => TypeSet::STRING,
            MirType::Symbol => TypeSet::SYMBOL,
            MirType::Object => TypeSet::OBJECT,
            MirType::Value => TypeSet::all(),
            MirType::None | MirType::OptimizedOut => TypeSet::empty(),
        }
    }

    /// Returns `true` if a value of type `ty` has been observed.
    #[must_use]
    pub fn has_seen(self, ty: MirType) -> bool {
        self.intersects(TypeSet::of(ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_display_names() {
        assert_eq!(MirType::Int32.to_string(), "int32");
        assert_eq!(MirType::OptimizedOut.to_string(), "optimized-out");
    }

    #[test]
    fn test_numeric_classes() {
        let numeric: Vec<MirType> = MirType::iter().filter(|t| t.is_numeric()).collect();
        assert_eq!(numeric, vec![MirType::Int32, MirType::Double, MirType::Float32]);
        assert!(!MirType::Double.converts_to_double());
        assert!(MirType::Float32.converts_to_double());
    }

    #[test]
    fn test_type_set_observation() {
        let seen = TypeSet::INT32 | TypeSet::NULL;
        assert!(seen.has_seen(MirType::Int32));
        assert!(seen.has_seen(MirType::Value));
        assert!(!seen.has_seen(MirType::Double));
        assert!(!TypeSet::empty().has_seen(MirType::OptimizedOut));
    }

    #[test]
    fn test_singletons() {
        assert!(MirType::Null.is_singleton());
        assert!(!MirType::Boolean.is_singleton());
        assert_eq!(MirType::COUNT, 12);
    }
}
