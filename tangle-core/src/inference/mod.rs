//! Inference
//!
//! Metropolis-Hastings over choice graphs, with structure-changing moves.
//!
//! # Pieces
//!
//! - [`Selection`] weights the proposable nodes and draws proposal targets
//! - [`step`] runs one proposal as a transaction and scores it
//! - an [`Acceptor`] turns the scores into a decision; the choice of
//!   acceptor is what separates exact sampling from annealing
//! - [`Sampler`] chains steps into a lazy sequence of [`Sample`]s
//! - [`initialize`] finds a first execution by rejection sampling
//! - the drivers ([`sample`], [`anneal`], [`annealed_importance`]) put it
//!   all together
//!
//! # Example
//!
//! ```rust,ignore
//! use rand::{rngs::StdRng, SeedableRng};
//! use tangle_core::distribution::builtin::flip;
//! use tangle_core::engine::Context;
//! use tangle_core::graph::{params, Value};
//! use tangle_core::inference::sample;
//!
//! let program = |ctx: &mut Context<'_>| ctx.random_with("coin", &flip(), params([0.3]));
//! let mut rng = StdRng::seed_from_u64(0);
//! let heads = sample(&program, &mut rng, &Default::default())?
//!     .take(10_000)
//!     .filter(|v| matches!(v, Ok(Value::Bool(true))))
//!     .count();
//! ```

mod acceptor;
mod diagnostics;
mod drivers;
mod init;
mod sampler;
mod selection;
mod stepper;

pub use acceptor::{AcceptanceTerms, Acceptor, AnnealingAcceptor, StandardAcceptor, TemperedAcceptor};
pub use diagnostics::{DiagnosticSink, NullSink, RecordingSink, Status, TracingSink};
pub use drivers::{anneal, anneal_samples, annealed_importance, sample, ImportanceRun};
pub use init::{initialize, Trace};
pub use sampler::{Sample, Sampler};
pub use selection::{weight_of, Selection};
pub use stepper::{step, StepOutcome};
