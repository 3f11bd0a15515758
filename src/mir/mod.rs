//! The mid-level IR: an SSA control-flow graph of typed definitions.
//!
//! # Key Components
//!
//! - [`MirGraph`] - arenas of blocks, definitions and snapshots with the
//!   mutation API that keeps operand and use lists consistent
//! - [`MirBlock`] - phis, instructions, CFG links and dominator-tree data
//! - [`MirValue`] - an instruction or phi: operation, operands, uses, type, flags
//! - [`MirOp`] - the closed set of operations
//! - [`Snapshot`] - deopt metadata captured at a program point
//! - [`MirBuilder`] - convenience construction for tests and embedders
//! - [`GraphVerifier`] - consistency checks run between passes
//!
//! # Ownership
//!
//! The graph owns every entity; everything else refers to entities by
//! stable id. Cycles between loop phis, dominator links and use lists are
//! therefore plain index cycles.

mod block;
mod builder;
mod display;
mod graph;
mod ids;
mod ops;
mod snapshot;
mod traversal;
mod types;
mod value;
mod verify;

pub use block::{BlockKind, MirBlock};
pub use builder::MirBuilder;
pub use graph::{GraphProperties, MirGraph};
pub use ids::{BlockId, SnapshotId, ValueId};
pub use ops::{ArithOp, CompareOp, ConstValue, GuardFilter, MirOp, UnboxMode};
pub use snapshot::{Snapshot, SnapshotAnchor, SnapshotOperand};
pub use types::{MirType, TypeSet};
pub use value::{DefFlags, MirValue, UseSite};
pub use verify::{GraphVerifier, VerificationReport};
