//! Tangle Core
//!
//! This crate provides the runtime core of the Tangle probabilistic
//! programming engine. It implements:
//!
//! - A graph of named choice points with automatic dependency tracking
//! - Incremental recomputation with change cutoff and garbage collection
//! - Metropolis-Hastings over that graph, including moves that create or
//!   destroy random choices
//! - Simulated annealing and annealed importance sampling drivers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: choice points, addresses, committed traces and scratch stores
//! - `engine`: the evaluation context, tracking, propagation and collection
//! - `distribution`: pluggable distribution descriptors and the built-ins
//! - `inference`: selection, the MH stepper, the sampler and its drivers
//! - `config`: sampler settings and annealing schedules
//!
//! # Example
//!
//! ```rust,ignore
//! use rand::{rngs::StdRng, SeedableRng};
//! use tangle_core::distribution::builtin::flip;
//! use tangle_core::engine::Context;
//! use tangle_core::graph::{params, NodeRef, Value};
//! use tangle_core::inference::sample;
//! use tangle_core::Result;
//!
//! // Two fair coins, and a noisy report that at least one came up heads.
//! fn program(ctx: &mut Context<'_>) -> Result<NodeRef> {
//!     let a = ctx.random_with("a", &flip(), params([0.5]))?;
//!     let b = ctx.random_with("b", &flip(), params([0.5]))?;
//!     let (ra, rb) = (a.clone(), b.clone());
//!     let report = ctx.random("report", &flip(), move |c| {
//!         let any = c.read(&ra)?.as_bool()? || c.read(&rb)?.as_bool()?;
//!         Ok(params([if any { 0.9 } else { 0.1 }]))
//!     })?;
//!     ctx.condition(&report, true)?;
//!     Ok(a)
//! }
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let draws = sample(&program, &mut rng, &Default::default())?;
//! let heads = draws
//!     .take(50_000)
//!     .filter(|v| matches!(v, Ok(Value::Bool(true))))
//!     .count();
//! // heads / 50_000 ≈ 0.64
//! ```

pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod graph;
pub mod inference;

pub use config::{AnnealingSchedule, SamplerConfig, SelectionMethod};
pub use distribution::Distribution;
pub use engine::{Context, Program};
pub use error::{EngineError, Result};
pub use graph::{Address, ChoiceMap, NodeRef, Value};
pub use inference::{Sample, Sampler, Trace};
