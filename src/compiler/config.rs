//! Configuration for the optimization pipeline.
//!
//! This module provides [`PipelineConfig`], which selects the optional stages
//! and the phi observability mode, and controls verification and graph
//! dumps between passes.

/// How strictly the phi reducer decides that a phi is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Observability {
    /// Only non-phi instruction consumers observe a phi.
    ///
    /// Appropriate while instruction-level information is still fresh, i.e.
    /// before other optimizations ran on the graph.
    #[default]
    Aggressive,
    /// Observable snapshot operands also observe a phi.
    ///
    /// Appropriate after prior optimization, when instruction-level
    /// information may have gone stale.
    Conservative,
}

/// Configuration for one pipeline run.
///
/// # Examples
///
/// ```rust
/// use mirflow::{Observability, PipelineConfig};
///
/// let config = PipelineConfig {
///     enable_float32: false,
///     ..PipelineConfig::conservative()
/// };
/// assert_eq!(config.observability, Observability::Conservative);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Phi observability mode (default: aggressive).
    pub observability: Observability,

    /// Try to specialize arithmetic to float32 when the target benefits
    /// from it (default: true). The lane is skipped anyway for graphs
    /// without float32 values.
    pub enable_float32: bool,

    /// Run the deopt-metadata pruner (default: true).
    pub enable_snapshot_pruning: bool,

    /// Run the redundancy eliminator (default: true).
    pub enable_redundancy_elimination: bool,

    /// Verify graph consistency after every pass (default: debug builds only).
    pub verify: bool,

    /// Emit a `trace!` dump of the graph after every pass (default: false).
    pub dump_graphs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            observability: Observability::Aggressive,
            enable_float32: true,
            enable_snapshot_pruning: true,
            enable_redundancy_elimination: true,
            verify: cfg!(debug_assertions),
            dump_graphs: false,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with conservative phi observability.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            observability: Observability::Conservative,
            ..Self::default()
        }
    }
}
