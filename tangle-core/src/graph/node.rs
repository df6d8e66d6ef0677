//! Choice Points
//!
//! This module defines the nodes that live in the choice graph.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use super::address::Address;
use super::value::{Params, Value};
use crate::distribution::Distribution;
use crate::engine::Context;
use crate::error::Result;

/// Body of a deterministic node.
pub type BodyFn = dyn Fn(&mut Context<'_>) -> Result<Value>;

/// Parameter closure of a probabilistic node.
pub type ParamsFn = dyn Fn(&mut Context<'_>) -> Result<Params>;

/// The kind of a choice point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Pure recomputation from the nodes it reads.
    Deterministic,

    /// A sampled variable with a cached log-likelihood.
    Probabilistic,
}

/// How to (re)build a choice point from scratch.
///
/// A node keeps its recipe for recomputation, and every [`NodeRef`] carries
/// one so that reading a node that was collected brings it back.
#[derive(Clone)]
pub enum Recipe {
    Deterministic {
        body: Rc<BodyFn>,
    },
    Probabilistic {
        distribution: Distribution,
        params: Rc<ParamsFn>,
    },
}

impl Recipe {
    /// Deterministic or probabilistic.
    pub fn kind(&self) -> NodeKind {
        match self {
            Recipe::Deterministic { .. } => NodeKind::Deterministic,
            Recipe::Probabilistic { .. } => NodeKind::Probabilistic,
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipe::Deterministic { .. } => f.write_str("Recipe::Deterministic"),
            Recipe::Probabilistic { distribution, .. } => f
                .debug_struct("Recipe::Probabilistic")
                .field("distribution", &distribution.name())
                .finish(),
        }
    }
}

/// Handle to a choice point, valid across stores.
#[derive(Clone, Debug)]
pub struct NodeRef {
    address: Address,
    recipe: Rc<Recipe>,
}

impl NodeRef {
    pub(crate) fn new(address: Address, recipe: Rc<Recipe>) -> Self {
        Self { address, recipe }
    }

    /// Get the node's address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.recipe.kind()
    }

    pub(crate) fn recipe(&self) -> &Rc<Recipe> {
        &self.recipe
    }
}

/// State only probabilistic nodes carry.
#[derive(Debug, Clone)]
pub struct RandomState {
    /// Parameters from the last recompute.
    pub params: Params,
    /// Log-density of the current value under `params`.
    pub log_likelihood: f64,
    /// Fixed to an observation; never proposed.
    pub conditioned: bool,
}

/// A node in the choice graph.
#[derive(Clone)]
pub struct ChoicePoint {
    address: Address,

    recipe: Rc<Recipe>,

    value: Value,

    /// Present iff the recipe is probabilistic.
    random: Option<RandomState>,

    /// Nodes this node read during its last recompute.
    dependencies: IndexSet<Address>,

    /// Nodes that read this node during their last recompute.
    dependents: IndexSet<Address>,

    /// Roots are never garbage collected.
    root: bool,
}

impl ChoicePoint {
    /// A freshly allocated node, not yet computed.
    pub(crate) fn new(address: Address, recipe: Rc<Recipe>, root: bool) -> Self {
        let random = match recipe.as_ref() {
            Recipe::Deterministic { .. } => None,
            Recipe::Probabilistic { .. } => Some(RandomState {
                params: Params::new(),
                log_likelihood: 0.0,
                conditioned: false,
            }),
        };
        Self {
            address,
            recipe,
            value: Value::Unit,
            random,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            root,
        }
    }

    /// Get the node's address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.recipe.kind()
    }

    /// The recipe that recreates this node.
    pub fn recipe(&self) -> &Rc<Recipe> {
        &self.recipe
    }

    /// Cached value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Distribution state; `None` for deterministic nodes.
    pub fn random(&self) -> Option<&RandomState> {
        self.random.as_ref()
    }

    pub(crate) fn random_mut(&mut self) -> Option<&mut RandomState> {
        self.random.as_mut()
    }

    /// Cached log-likelihood; deterministic nodes contribute zero.
    pub fn log_likelihood(&self) -> f64 {
        self.random.as_ref().map_or(0.0, |r| r.log_likelihood)
    }

    /// Whether an observation is pinned to this node.
    pub fn is_conditioned(&self) -> bool {
        self.random.as_ref().is_some_and(|r| r.conditioned)
    }

    /// Probabilistic and not conditioned: a candidate for proposals.
    pub fn is_proposable(&self) -> bool {
        self.random.as_ref().is_some_and(|r| !r.conditioned)
    }

    /// Roots are never collected.
    pub fn is_root(&self) -> bool {
        self.root
    }

    pub(crate) fn mark_root(&mut self) {
        self.root = true;
    }

    /// Add a dependency (a node that this node reads from).
    pub(crate) fn add_dependency(&mut self, address: Address) {
        self.dependencies.insert(address);
    }

    /// Remove a dependency. Returns whether it was present.
    pub(crate) fn remove_dependency(&mut self, address: &Address) -> bool {
        self.dependencies.shift_remove(address)
    }

    /// Nodes this node read.
    pub fn dependencies(&self) -> &IndexSet<Address> {
        &self.dependencies
    }

    pub(crate) fn take_dependencies(&mut self) -> IndexSet<Address> {
        std::mem::take(&mut self.dependencies)
    }

    /// Add a dependent (a node that reads from this node).
    pub(crate) fn add_dependent(&mut self, address: Address) {
        self.dependents.insert(address);
    }

    /// Remove a dependent. Returns whether it was present.
    pub(crate) fn remove_dependent(&mut self, address: &Address) -> bool {
        self.dependents.shift_remove(address)
    }

    /// Nodes that read this node.
    pub fn dependents(&self) -> &IndexSet<Address> {
        &self.dependents
    }
}

impl fmt::Debug for ChoicePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoicePoint")
            .field("address", &self.address)
            .field("kind", &self.kind())
            .field("value", &self.value)
            .field("random", &self.random)
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .field("root", &self.root)
            .finish()
    }
}
