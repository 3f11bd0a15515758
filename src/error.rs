use std::collections::TryReserveError;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, covering every failure a pipeline run can report.
///
/// A failed run leaves its graph in a state that is safe to drop but not safe
/// to resume or hand to a code generator. Drivers are expected to abandon the
/// compilation unit and fall back to a lower tier.
///
/// # Error Categories
///
/// ## Resource Errors
/// - [`Error::OutOfMemory`] - An arena, worklist or block list could not grow
///
/// ## Control Errors
/// - [`Error::Cancelled`] - The caller's cancellation predicate fired
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The graph violated a contract a pass relies on
/// - [`Error::GraphError`] - The graph API was used with invalid arguments
/// - [`Error::VerificationFailed`] - The consistency verifier found violations
///
/// # Examples
///
/// ```rust
/// use mirflow::{Error, MirBuilder, PassPipeline, PipelineConfig, CompileContext};
///
/// let mut builder = MirBuilder::new("empty");
/// let entry = builder.entry();
/// let undefined = builder.undefined(entry)?;
/// builder.ret(entry, undefined)?;
/// let mut graph = builder.finish();
///
/// let ctx = CompileContext::new(PipelineConfig::default());
/// match PassPipeline::standard(ctx.config()).run(&mut graph, &ctx) {
///     Ok(report) => println!("{} passes ran", report.passes.len()),
///     Err(e) if e.is_cancelled() => println!("abandoned"),
///     Err(e) => eprintln!("compilation failed: {e}"),
/// }
/// # Ok::<(), mirflow::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A structural contract of the graph was violated.
    ///
    /// Raised when a pass finds an edge, operand or block in a shape it cannot
    /// work with, e.g. a successor that does not list its predecessor.
    /// The error includes the source location where it was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Allocation of a block, instruction, snapshot or worklist entry failed.
    ///
    /// Every growth of the graph arenas and pass worklists reserves capacity
    /// fallibly, so exhaustion surfaces here instead of aborting the process.
    #[error("Allocation failed: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// The compilation was abandoned by the caller.
    ///
    /// Returned by the first cancellation poll that observes the predicate
    /// set. Carries the stage that noticed it. Not resumable.
    #[error("Compilation cancelled during {stage}")]
    Cancelled {
        /// The pipeline stage that observed the cancellation request
        stage: &'static str,
    },

    /// The graph consistency verifier rejected the graph.
    ///
    /// Only produced when verification is enabled in the pipeline
    /// configuration, which is the default for debug builds.
    #[error("Verification failed after {pass}: {}", issues.join("; "))]
    VerificationFailed {
        /// Name of the pass after which verification ran
        pass: String,
        /// Every violated invariant, one message each
        issues: Vec<String>,
    },

    /// The graph API was called with arguments that cannot be honored.
    ///
    /// For example an operand index out of range, or an id of a block or
    /// value that has already been discarded.
    #[error("{0}")]
    GraphError(String),
}

impl Error {
    /// Returns `true` if this error is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
