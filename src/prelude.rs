//! # mirflow Prelude
//!
//! Everything needed to build a graph and run the standard pipeline over it.
//!
//! ```rust
//! use mirflow::prelude::*;
//!
//! let mut b = MirBuilder::new("identity");
//! let entry = b.entry();
//! let p = b.parameter(entry, 0)?;
//! b.ret(entry, p)?;
//! let mut graph = b.finish();
//!
//! let ctx = CompileContext::default();
//! PassPipeline::standard(ctx.config()).run(&mut graph, &ctx)?;
//! assert!(graph.properties().contains(GraphProperties::TYPES_SPECIALIZED));
//! # Ok::<(), mirflow::Error>(())
//! ```

// ================================================================================================
// Core error handling
// ================================================================================================

/// The main error type for all mirflow operations
pub use crate::Error;

/// Convenience Result type alias
pub use crate::Result;

// ================================================================================================
// IR
// ================================================================================================

/// Graph, builder and verifier
pub use crate::mir::{GraphProperties, GraphVerifier, MirBuilder, MirGraph, VerificationReport};

/// Blocks, definitions and snapshots
pub use crate::mir::{
    BlockId, BlockKind, DefFlags, MirBlock, MirValue, Snapshot, SnapshotAnchor, SnapshotId,
    SnapshotOperand, UseSite, ValueId,
};

/// Operations and types
pub use crate::mir::{ArithOp, CompareOp, ConstValue, GuardFilter, MirOp, MirType, TypeSet, UnboxMode};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Configuration, context and execution
pub use crate::compiler::{
    CancelFlag, CompileContext, MirPass, Observability, PassPipeline, PassRecord, PipelineConfig,
    PipelineReport,
};

/// Type feedback
pub use crate::compiler::{NoFeedback, ObservedTypes, TypeOracle};

/// Event log
pub use crate::compiler::{Event, EventKind, EventLog};

/// Built-in passes
pub use crate::compiler::passes::{
    DominatorPass, EdgeSplitPass, PhiEliminationPass, RedundancyEliminationPass, SnapshotPrunePass,
    TypeSpecializationPass,
};
