//! Choice Graph
//!
//! This module implements the data model of a traced program execution:
//! named choice points and the read-edges between them.
//!
//! # Overview
//!
//! The choice graph is a directed graph where:
//!
//! - Nodes are choice points, either deterministic (a cached pure
//!   computation) or probabilistic (a sampled variable with a cached
//!   log-likelihood)
//! - Edges record reads: if B read A during its last recompute, then
//!   `B ∈ dependents(A)` and `A ∈ dependencies(B)`
//!
//! When a value changes, the engine walks `dependents` to find what has to
//! be recomputed, and walks `dependencies` when a node is collected to
//! release what it read.
//!
//! # Design Decisions
//!
//! 1. Nodes are keyed by hierarchical [`Address`] rather than by a counter,
//!    so that re-running a body finds the nodes it created last time.
//!
//! 2. Maps and sets are insertion-ordered (`indexmap`). Iteration order
//!    feeds the random stream, so it has to be reproducible.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents)
//!    edges to enable efficient traversal in both directions.

mod address;
mod node;
mod store;
mod value;

pub use address::{Address, Segment};
pub use node::{BodyFn, ChoicePoint, NodeKind, NodeRef, ParamsFn, RandomState, Recipe};
pub use store::{ChangeSet, ChoiceLookup, ChoiceMap, Store};
pub use value::{params, Params, Value};
