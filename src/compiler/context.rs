//! Shared, read-only state of a pipeline run.
//!
//! A [`CompileContext`] bundles the configuration, the type-feedback oracle,
//! the cancellation predicate and the event log. Passes receive it by shared
//! reference; it is `Sync` so one context can serve every unit compiled by
//! [`PassPipeline::run_all`](crate::PassPipeline::run_all).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::debug;

use crate::{
    compiler::{EventLog, NoFeedback, PipelineConfig, TypeOracle},
    Error, Result,
};

type CancelPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// A cloneable cancellation switch shared between a driver and its
/// compilations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every compilation watching this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Context threaded through every pass.
///
/// # Examples
///
/// ```rust
/// use mirflow::{CompileContext, PipelineConfig};
/// use mirflow::compiler::CancelFlag;
///
/// let flag = CancelFlag::new();
/// let ctx = CompileContext::new(PipelineConfig::default()).with_cancel_flag(flag.clone());
/// assert!(ctx.check_cancelled("dominators").is_ok());
///
/// flag.cancel();
/// assert!(ctx.check_cancelled("dominators").unwrap_err().is_cancelled());
/// ```
pub struct CompileContext {
    config: PipelineConfig,
    oracle: Arc<dyn TypeOracle>,
    cancel: Option<CancelPredicate>,
    /// Transformations performed so far.
    pub events: EventLog,
}

impl CompileContext {
    /// Creates a context without type feedback or cancellation.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            oracle: Arc::new(NoFeedback),
            cancel: None,
            events: EventLog::new(),
        }
    }

    /// Replaces the type-feedback oracle.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn TypeOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Installs a cancellation predicate polled by every pass.
    #[must_use]
    pub fn with_cancellation(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.cancel = Some(Arc::new(predicate));
        self
    }

    /// Installs a [`CancelFlag`] as the cancellation predicate.
    #[must_use]
    pub fn with_cancel_flag(self, flag: CancelFlag) -> Self {
        self.with_cancellation(move || flag.is_cancelled())
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the type-feedback oracle.
    #[must_use]
    pub fn oracle(&self) -> &dyn TypeOracle {
        self.oracle.as_ref()
    }

    /// Polls the cancellation predicate.
    #[must_use]
    pub fn should_cancel(&self) -> bool {
        self.cancel.as_ref().is_some_and(|predicate| predicate())
    }

    /// Returns [`Error::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] naming `stage`.
    pub fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        if self.should_cancel() {
            debug!(stage, "compilation cancelled");
            return Err(Error::Cancelled { stage });
        }
        Ok(())
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl std::fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileContext")
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .field("events", &self.events.len())
            .finish()
    }
}
