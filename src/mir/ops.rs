//! Instruction kinds.
//!
//! [`MirOp`] is the closed set of operations the IR knows about. Everything
//! that differs per kind (flags, natural result type, float32 behaviour, the
//! type policy applied by the specializer) is dispatched with a `match` over
//! this enum, so adding a kind forces every pass to decide how to treat it.
//!
//! Operand layout per kind:
//!
//! | Kind           | Operands                     |
//! |----------------|------------------------------|
//! | `Arith`        | `[lhs, rhs]`                 |
//! | `Compare`      | `[lhs, rhs]`                 |
//! | `Not`, `Box`, `Unbox`, `To*`, `TypeGuard` | `[input]` |
//! | `ArrayLength`  | `[object]`                   |
//! | `LoadElement`  | `[object, index]`            |
//! | `StoreElement` | `[object, index, value]`     |
//! | `BoundsCheck`  | `[index, length]`            |
//! | `Call`         | `[callee, args...]`          |
//! | `Test`         | `[condition]`                |
//! | `Return`       | `[value]`                    |
//!
//! A `Test` branches to its block's first successor when the condition is
//! truthy and to the second otherwise.

use bitflags::bitflags;
use strum::Display;

use crate::mir::{DefFlags, MirType};

/// Largest integer magnitude a float32 holds exactly.
const FLOAT32_EXACT_INT: i32 = 1 << 24;

/// A compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// A boolean literal
    Boolean(bool),
    /// An int32 literal
    Int32(i32),
    /// A double literal
    Double(f64),
    /// The placeholder substituted for values proven unobservable
    OptimizedOut,
}

impl ConstValue {
    /// Returns the IR type of this constant.
    #[must_use]
    pub const fn ty(&self) -> MirType {
        match self {
            ConstValue::Undefined => MirType::Undefined,
            ConstValue::Null => MirType::Null,
            ConstValue::Boolean(_) => MirType::Boolean,
            ConstValue::Int32(_) => MirType::Int32,
            ConstValue::Double(_) => MirType::Double,
            ConstValue::OptimizedOut => MirType::OptimizedOut,
        }
    }

    /// Returns `true` if the constant survives a round trip through float32.
    #[must_use]
    pub fn is_float32_representable(&self) -> bool {
        match *self {
            ConstValue::Int32(v) => (-FLOAT32_EXACT_INT..=FLOAT32_EXACT_INT).contains(&v),
            #[allow(clippy::cast_possible_truncation)]
            ConstValue::Double(v) => f64::from(v as f32) == v,
            _ => false,
        }
    }

    /// Returns the constant for a singleton type.
    #[must_use]
    pub const fn for_singleton(ty: MirType) -> Option<ConstValue> {
        match ty {
            MirType::Undefined => Some(ConstValue::Undefined),
            MirType::Null => Some(ConstValue::Null),
            MirType::OptimizedOut => Some(ConstValue::OptimizedOut),
            _ => None,
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ArithOp {
    /// `lhs + rhs`
    Add,
    /// `lhs - rhs`
    Sub,
    /// `lhs * rhs`
    Mul,
    /// `lhs / rhs`
    Div,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CompareOp {
    /// `===`
    #[strum(to_string = "===")]
    StrictEq,
    /// `!==`
    #[strum(to_string = "!==")]
    StrictNe,
    /// `==`
    #[strum(to_string = "==")]
    LooseEq,
    /// `!=`
    #[strum(to_string = "!=")]
    LooseNe,
    /// `<`
    #[strum(to_string = "<")]
    Lt,
    /// `<=`
    #[strum(to_string = "<=")]
    Le,
    /// `>`
    #[strum(to_string = ">")]
    Gt,
    /// `>=`
    #[strum(to_string = ">=")]
    Ge,
}

/// How an unboxing behaves when the value has a different type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnboxMode {
    /// Bails out on a type mismatch
    Fallible,
    /// Known to succeed
    Infallible,
    /// Follows a type barrier that checked the type; only the barrier's
    /// null and undefined filters remain to be proven
    TypeBarrier,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Values a type guard rejects.
    pub struct GuardFilter: u8 {
        /// Bails out on `undefined`
        const UNDEFINED = 0x01;
        /// Bails out on `null`
        const NULL = 0x02;
    }
}

/// The operation performed by a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum MirOp {
    /// SSA merge at a block head
    Phi,
    /// Incoming argument with the given position
    Parameter(u32),
    /// A literal
    Constant(ConstValue),
    /// Binary arithmetic specialized to a numeric type, or `Value` for the generic case
    Arith {
        /// The operator
        op: ArithOp,
        /// The type the operation is carried out in
        specialization: MirType,
    },
    /// Comparison producing a boolean
    Compare {
        /// The operator
        op: CompareOp,
        /// The type both operands are compared as
        operand_type: MirType,
    },
    /// Logical negation of the input's truthiness
    Not,
    /// Wraps a typed value into a `Value`
    Box,
    /// Extracts a typed value from a `Value`
    Unbox {
        /// The type extracted
        target: MirType,
        /// Failure behaviour
        mode: UnboxMode,
    },
    /// Converts a numeric input to double
    ToDouble,
    /// Converts a numeric input to float32
    ToFloat32,
    /// Converts to int32, bailing out if the value is not an exact int32
    ToInt32,
    /// Length of an array object
    ArrayLength,
    /// Element read
    LoadElement {
        /// Representation of the loaded element
        elem_type: MirType,
    },
    /// Element write
    StoreElement {
        /// Representation of the stored element
        elem_type: MirType,
    },
    /// Bails out unless `index + minimum >= 0` and `index + maximum < length`
    BoundsCheck {
        /// Smallest offset checked
        minimum: i32,
        /// Largest offset checked
        maximum: i32,
    },
    /// Bails out if the input is one of the filtered values
    TypeGuard {
        /// Rejected values
        filters: GuardFilter,
    },
    /// Opaque call
    Call,
    /// Conditional branch on the truthiness of the condition
    Test,
    /// Unconditional branch
    Goto,
    /// Function return
    Return,
}

impl MirOp {
    /// Short lowercase mnemonic used in dumps and logs.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            MirOp::Phi => "phi",
            MirOp::Parameter(_) => "parameter",
            MirOp::Constant(_) => "constant",
            MirOp::Arith { op, .. } => match op {
                ArithOp::Add => "add",
                ArithOp::Sub => "sub",
                ArithOp::Mul => "mul",
                ArithOp::Div => "div",
            },
            MirOp::Compare { .. } => "compare",
            MirOp::Not => "not",
            MirOp::Box => "box",
            MirOp::Unbox { .. } => "unbox",
            MirOp::ToDouble => "todouble",
            MirOp::ToFloat32 => "tofloat32",
            MirOp::ToInt32 => "toint32",
            MirOp::ArrayLength => "arraylength",
            MirOp::LoadElement { .. } => "loadelement",
            MirOp::StoreElement { .. } => "storeelement",
            MirOp::BoundsCheck { .. } => "boundscheck",
            MirOp::TypeGuard { .. } => "typeguard",
            MirOp::Call => "call",
            MirOp::Test => "test",
            MirOp::Goto => "goto",
            MirOp::Return => "return",
        }
    }

    /// Flags every definition of this kind starts with.
    #[must_use]
    pub fn base_flags(&self) -> DefFlags {
        match self {
            MirOp::Phi | MirOp::Parameter(_) => DefFlags::empty(),
            MirOp::Constant(_)
            | MirOp::Compare { .. }
            | MirOp::Box
            | MirOp::ArrayLength
            | MirOp::LoadElement { .. } => DefFlags::MOVABLE,
            MirOp::Arith { .. } | MirOp::Not | MirOp::ToDouble | MirOp::ToFloat32 => {
                DefFlags::MOVABLE | DefFlags::RECOVERABLE
            }
            MirOp::Unbox { mode, .. } => match mode {
                UnboxMode::Fallible | UnboxMode::TypeBarrier => DefFlags::MOVABLE | DefFlags::GUARD,
                UnboxMode::Infallible => DefFlags::MOVABLE,
            },
            MirOp::ToInt32 | MirOp::BoundsCheck { .. } | MirOp::TypeGuard { .. } => {
                DefFlags::MOVABLE | DefFlags::GUARD
            }
            MirOp::StoreElement { .. } | MirOp::Call => DefFlags::EFFECTFUL,
            MirOp::Test | MirOp::Goto | MirOp::Return => DefFlags::CONTROL,
        }
    }

    /// The result type of this kind when its operands do not refine it.
    #[must_use]
    pub const fn natural_type(&self) -> MirType {
        match self {
            MirOp::Phi
            | MirOp::StoreElement { .. }
            | MirOp::Test
            | MirOp::Goto
            | MirOp::Return => MirType::None,
            MirOp::Parameter(_) | MirOp::Box | MirOp::Call | MirOp::TypeGuard { .. } => {
                MirType::Value
            }
            MirOp::Constant(value) => value.ty(),
            MirOp::Arith { specialization, .. } => *specialization,
            MirOp::Compare { .. } | MirOp::Not => MirType::Boolean,
            MirOp::Unbox { target, .. } => *target,
            MirOp::ToDouble => MirType::Double,
            MirOp::ToFloat32 => MirType::Float32,
            MirOp::ToInt32 | MirOp::ArrayLength | MirOp::BoundsCheck { .. } => MirType::Int32,
            MirOp::LoadElement { elem_type } => *elem_type,
        }
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(self, MirOp::Test | MirOp::Goto | MirOp::Return)
    }

    /// Returns `true` for phis.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, MirOp::Phi)
    }

    /// Returns `true` for constants.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, MirOp::Constant(_))
    }

    /// Returns `true` for the optimized-out placeholder constant.
    #[must_use]
    pub const fn is_optimized_out(&self) -> bool {
        matches!(self, MirOp::Constant(ConstValue::OptimizedOut))
    }

    /// Returns the int32 payload of an int32 constant.
    #[must_use]
    pub const fn as_int32(&self) -> Option<i32> {
        match self {
            MirOp::Constant(ConstValue::Int32(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` for operations whose float32 and double results agree
    /// after rounding when all inputs are float32.
    #[must_use]
    pub const fn is_float32_commutative(&self) -> bool {
        matches!(
            self,
            MirOp::Arith {
                op: ArithOp::Add | ArithOp::Sub | ArithOp::Mul | ArithOp::Div,
                specialization: MirType::Double,
            }
        )
    }
}
