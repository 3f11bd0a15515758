//! Ordered execution of the optimization stages.
//!
//! [`PassPipeline`] runs its passes once each, in insertion order, over one
//! graph. Between passes it optionally dumps and verifies the graph. The
//! standard pipeline is:
//!
//! 1. **Edges**: critical-edge splitting
//! 2. **Dominators**: RPO numbering and dominator tree
//! 3. **Phis**: redundant and unobservable phi removal
//! 4. **Typing**: phi specialization, conversions, float32 lane
//! 5. **Snapshots**: dead snapshot operand pruning (optional)
//! 6. **Redundancy**: dead code, bounds checks and type guards (optional)
//!
//! Several units can be compiled in parallel with [`PassPipeline::run_all`];
//! each graph is exclusively owned by one worker, only the context is shared.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::{
    compiler::{
        passes::{
            DominatorPass, EdgeSplitPass, PhiEliminationPass, RedundancyEliminationPass,
            SnapshotPrunePass, TypeSpecializationPass,
        },
        CompileContext, MirPass, PipelineConfig,
    },
    mir::{GraphVerifier, MirGraph},
    Result,
};

/// Outcome of one pass within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    /// Name of the pass.
    pub name: &'static str,
    /// Whether the pass changed the graph.
    pub changed: bool,
}

/// Outcome of a pipeline run over one graph.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Passes that ran, in order. Skipped passes are not listed.
    pub passes: Vec<PassRecord>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Returns `true` if any pass changed the graph.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.passes.iter().any(|p| p.changed)
    }

    /// Returns `true` if the named pass ran.
    #[must_use]
    pub fn ran(&self, name: &str) -> bool {
        self.passes.iter().any(|p| p.name == name)
    }
}

/// An ordered list of passes.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn MirPass>>,
}

impl PassPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the standard pipeline for `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Selects the optional stages and the phi observability mode.
    ///
    /// # Returns
    ///
    /// A pipeline running every enabled stage in dependency order.
    #[must_use]
    pub fn standard(config: &PipelineConfig) -> Self {
        let mut pipeline = Self::new()
            .add(EdgeSplitPass)
            .add(DominatorPass)
            .add(PhiEliminationPass::new(config.observability))
            .add(TypeSpecializationPass);
        if config.enable_snapshot_pruning {
            pipeline = pipeline.add(SnapshotPrunePass);
        }
        if config.enable_redundancy_elimination {
            pipeline = pipeline.add(RedundancyEliminationPass);
        }
        pipeline
    }

    /// Appends a pass.
    #[must_use]
    pub fn add(mut self, pass: impl MirPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Returns the names of the passes in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every pass once over `graph`.
    ///
    /// # Arguments
    ///
    /// * `graph` - The unit to optimize, mutated in place.
    /// * `ctx` - The shared compilation context.
    ///
    /// # Returns
    ///
    /// A report listing the passes that ran.
    ///
    /// # Errors
    ///
    /// Returns the first pass failure, [`Error::Cancelled`](crate::Error::Cancelled)
    /// on cancellation, or [`Error::VerificationFailed`](crate::Error::VerificationFailed)
    /// when verification is enabled and a pass broke an invariant. The graph
    /// must be discarded after any error.
    pub fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<PipelineReport> {
        let start = Instant::now();
        let mut report = PipelineReport::default();
        let config = ctx.config();

        if config.verify {
            GraphVerifier::verify(graph).into_result("input")?;
        }

        for pass in &self.passes {
            ctx.check_cancelled(pass.name())?;
            if !pass.should_run(graph, ctx) {
                debug!(unit = graph.name(), pass = pass.name(), "skipped");
                continue;
            }

            let changed = pass.run(graph, ctx)?;
            report.passes.push(PassRecord {
                name: pass.name(),
                changed,
            });

            if config.dump_graphs {
                trace!(unit = graph.name(), pass = pass.name(), "graph after pass:\n{graph}");
            }
            if config.verify {
                let verification = GraphVerifier::verify(graph);
                if !verification.is_ok() {
                    warn!(
                        unit = graph.name(),
                        pass = pass.name(),
                        issues = verification.issues.len(),
                        "graph verification failed"
                    );
                }
                verification.into_result(pass.name())?;
            }
        }

        report.elapsed = start.elapsed();
        debug!(
            unit = graph.name(),
            passes = report.passes.len(),
            elapsed_us = report.elapsed.as_micros(),
            "pipeline finished"
        );
        Ok(report)
    }

    /// Runs the pipeline over several units in parallel.
    ///
    /// Each graph is processed by one rayon worker; results are returned in
    /// the order of `graphs`. A failure only affects its own unit.
    pub fn run_all(&self, graphs: &mut [MirGraph], ctx: &CompileContext) -> Vec<Result<PipelineReport>> {
        graphs
            .par_iter_mut()
            .map(|graph| self.run(graph, ctx))
            .collect()
    }
}

impl std::fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassPipeline")
            .field("passes", &self.pass_names())
            .finish()
    }
}
