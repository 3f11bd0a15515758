//! The interface every pipeline stage implements.

use crate::{compiler::CompileContext, mir::MirGraph, Result};

/// A transformation over one compilation unit's graph.
///
/// All passes must be thread-safe (Send + Sync) so one pipeline can compile
/// several units in parallel. Passes receive exclusive access to the graph
/// and shared access to the context; they record rewrites in
/// [`CompileContext::events`] and poll for cancellation at their loop heads.
///
/// Passes run in a fixed order, and each may rely on the
/// [`GraphProperties`](crate::mir::GraphProperties) established by earlier
/// ones.
pub trait MirPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Short description for logs.
    fn description(&self) -> &'static str {
        ""
    }

    /// Should this pass run on this graph?
    ///
    /// Called before `run`. Override to skip graphs the pass cannot improve.
    fn should_run(&self, _graph: &MirGraph, _ctx: &CompileContext) -> bool {
        true
    }

    /// Runs the pass. Returns `true` if the graph changed.
    ///
    /// # Arguments
    ///
    /// * `graph` - The graph to transform.
    /// * `ctx` - The shared compilation context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) when cancellation
    /// was requested and [`Error::OutOfMemory`](crate::Error::OutOfMemory)
    /// when an allocation fails. The graph must then be discarded.
    fn run(&self, graph: &mut MirGraph, ctx: &CompileContext) -> Result<bool>;
}
