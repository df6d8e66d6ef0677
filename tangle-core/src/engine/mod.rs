//! Incremental Evaluation Engine
//!
//! This module runs program code against the choice graph and keeps the
//! graph consistent as values change.
//!
//! # Concepts
//!
//! ## Context
//!
//! Every program and node body receives a `&mut Context`. It holds the
//! scratch store of the current evaluation, the random source, and a stack
//! of the node bodies currently running.
//!
//! ## Tracking
//!
//! When a node is read while a body is running, the body's node is recorded
//! as a dependent of the node it read. Bodies re-run on every recompute, so
//! a node's dependencies are always the reads of its most recent run.
//!
//! ## Propagation
//!
//! When a value changes, its dependents are recomputed breadth-first. A
//! deterministic node whose value comes out equal stops the wave there;
//! probabilistic nodes are rescored and always stop it.
//!
//! ## Collection
//!
//! Nodes that lose their last dependent and are not roots are deleted,
//! together with anything only they kept alive.
//!
//! # Implementation Notes
//!
//! There is no global state. The caller stack lives on the context, so two
//! contexts (say, the committed trace and a proposal) never see each other's
//! tracking.

mod collector;
mod context;
mod propagator;
mod tracker;

pub use context::{Context, Program};
