//! Built-in pipeline stages.
//!
//! Each stage implements [`MirPass`](crate::compiler::MirPass), mutates the
//! graph in place and records its rewrites in the context's
//! [`EventLog`](crate::compiler::EventLog).
//!
//! # Standard Order
//!
//! | Pass | Name | Establishes |
//! |------|------|-------------|
//! | [`EdgeSplitPass`] | `edges` | no critical edges |
//! | [`DominatorPass`] | `dominators` | RPO block order, dominator tree |
//! | [`PhiEliminationPass`] | `phis` | no redundant or unobservable phis |
//! | [`TypeSpecializationPass`] | `typing` | concrete, consistent phi types |
//! | [`SnapshotPrunePass`] | `snapshots` | snapshots hold only still-needed values |
//! | [`RedundancyEliminationPass`] | `redundancy` | no dominated duplicate checks or dead code |
//!
//! Later stages rely on what earlier ones establish: phi inputs are
//! converted on incoming edges, which needs split edges; the redundancy
//! walk needs dominator pre-order indices.

mod dominators;
mod edges;
mod phis;
mod redundancy;
mod snapshots;
mod typing;

pub use dominators::DominatorPass;
pub use edges::EdgeSplitPass;
pub use phis::PhiEliminationPass;
pub use redundancy::{LinearSum, RedundancyEliminationPass, RedundancyStats};
pub use snapshots::SnapshotPrunePass;
pub use typing::{required_type, TypeSpecializationPass, TypingStats};
