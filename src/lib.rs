// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # mirflow
//!
//! The optimization core of a method-at-a-time JIT: a fixed sequence of
//! passes over a typed SSA intermediate representation, run after the
//! bytecode frontend has built the graph and before code generation.
//!
//! ## Features
//!
//! - **Arena IR** - blocks, definitions and deopt snapshots addressed by
//!   stable ids, with operand and use lists kept in sync by the graph
//! - **Control-flow normalization** - critical edge splitting and an
//!   iterative dominator tree with O(1) dominance queries
//! - **Phi reduction** - redundant and unobservable phis removed by one
//!   shared worklist
//! - **Type specialization** - a small phi type lattice, conversion
//!   insertion on incoming edges, and a reduced-precision float32 lane
//! - **Redundancy elimination** - bounds-check folding, null/undefined
//!   guard elimination, dead code removal
//! - **Snapshot pruning** - deopt captures dropped past a value's last use
//! - **Cooperative cancellation** - every stage polls the caller's
//!   predicate and returns [`Error::Cancelled`]
//!
//! ## Quick Start
//!
//! ```rust
//! use mirflow::{CompileContext, MirBuilder, PassPipeline, PipelineConfig};
//! use mirflow::mir::MirType;
//!
//! // function f(a) { var x = a ? 1 : 2; return x + x; }
//! let mut b = MirBuilder::new("f");
//! let entry = b.entry();
//! let then_block = b.block()?;
//! let else_block = b.block()?;
//! let join = b.block()?;
//! let a = b.parameter(entry, 0)?;
//! b.test(entry, a, then_block, else_block)?;
//! let one = b.int32(then_block, 1)?;
//! b.goto(then_block, join)?;
//! let two = b.int32(else_block, 2)?;
//! b.goto(else_block, join)?;
//! let x = b.phi(join, &[one, two])?;
//! let sum = b.add(join, MirType::Int32, x, x)?;
//! b.ret(join, sum)?;
//! let mut graph = b.finish();
//!
//! let ctx = CompileContext::new(PipelineConfig::default());
//! let report = PassPipeline::standard(ctx.config()).run(&mut graph, &ctx)?;
//! assert!(report.ran("typing"));
//! assert_eq!(graph[x].ty(), MirType::Int32);
//! # Ok::<(), mirflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`mir`] - the IR data model, builder, verifier and graph dump
//! - [`compiler`] - configuration, compile context, event log, the pass
//!   trait, the pipeline and the built-in passes
//! - [`utils`] - id-keyed bit sets and worklists
//!
//! A graph is owned exclusively by one pipeline run. Independent graphs can
//! be compiled in parallel with [`PassPipeline::run_all`], which shares one
//! read-only [`CompileContext`] between workers.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use mirflow::prelude::*;
///
/// let graph = MirBuilder::new("empty").finish();
/// assert_eq!(graph.block_count(), 1);
/// ```
pub mod prelude;

/// The pass pipeline and the built-in passes.
///
/// # Key Components
///
/// - [`compiler::PipelineConfig`] - which stages run and how
/// - [`compiler::CompileContext`] - configuration, type oracle, cancellation
///   and event log shared by all passes of a run
/// - [`compiler::MirPass`] - the interface every stage implements
/// - [`compiler::PassPipeline`] - ordered execution with optional
///   verification between passes
/// - [`compiler::passes`] - edge splitting, dominators, phi reduction,
///   type specialization, redundancy elimination, snapshot pruning
pub mod compiler;

/// The mid-level IR.
///
/// See [`mir::MirGraph`] for the graph and its mutation API, and
/// [`mir::MirBuilder`] for convenient construction.
pub mod mir;

/// Id-keyed collections used by the IR and the passes.
pub mod utils;

/// `mirflow` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `mirflow` Error type
///
/// See [`error::Error`](Error) for the error categories.
pub use error::Error;

/// Frontend stand-in for constructing graphs.
pub use mir::MirBuilder;

/// Pipeline entry points.
pub use compiler::{CompileContext, Observability, PassPipeline, PipelineConfig};
