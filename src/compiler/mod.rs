//! The optimization pipeline.
//!
//! # Key Components
//!
//! - [`PassPipeline`] - runs the stages in order over one or many graphs
//! - [`MirPass`] - the interface each stage implements
//! - [`CompileContext`] - configuration, type feedback, cancellation, events
//! - [`PipelineConfig`] - optional stages and modes
//! - [`EventLog`] - structured record of every rewrite
//! - [`passes`] - the stages themselves

mod config;
mod context;
mod events;
mod oracle;
mod pass;
mod pipeline;

pub mod passes;

pub use config::{Observability, PipelineConfig};
pub use context::{CancelFlag, CompileContext};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use oracle::{NoFeedback, ObservedTypes, TypeOracle};
pub use pass::MirPass;
pub use pipeline::{PassPipeline, PassRecord, PipelineReport};
