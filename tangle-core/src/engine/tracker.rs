//! Dependency Tracking
//!
//! Creating, referencing and recomputing choice points. Every read goes
//! through [`Context::reference`], which is where edges get recorded.
//!
//! Recomputing a node throws away its old dependency set, re-runs its body
//! with the node on top of the caller stack (so every read re-registers an
//! edge), and then retracts the edges the new run no longer made. Retracting
//! can orphan a node; orphans are queued for the collector.

use std::rc::Rc;

use tracing::trace;

use super::context::Context;
use crate::distribution::Distribution;
use crate::error::{EngineError, Result};
use crate::graph::{Address, ChoicePoint, NodeRef, Params, Recipe, Value};

/// Output of running a node's closure.
pub(super) enum Evaluated {
    /// A deterministic body's value.
    Value(Value),
    /// A probabilistic node's parameters, with its family.
    Params {
        distribution: Distribution,
        params: Params,
    },
}

impl Context<'_> {
    /// Make sure `node` exists and, if a body is running, record that the
    /// body read it.
    pub(crate) fn reference(&mut self, node: &NodeRef) -> Result<()> {
        let address = node.address();
        match self.store.get(address) {
            Some(existing) if existing.kind() != node.kind() => {
                return Err(EngineError::config(format!(
                    "{address} is already a {:?} node, cannot reuse it as {:?}",
                    existing.kind(),
                    node.kind()
                )));
            }
            Some(_) => {}
            None => self.create(node)?,
        }
        if let Some(caller) = self.callers.last().cloned() {
            if &caller != address {
                self.store.add_edge(address, &caller)?;
            }
        }
        Ok(())
    }

    /// Read a node's current value, creating it if needed.
    pub fn read(&mut self, node: &NodeRef) -> Result<Value> {
        self.reference(node)?;
        self.store
            .get(node.address())
            .map(|choice| choice.value().clone())
            .ok_or_else(|| EngineError::invariant(format!("no choice point at {}", node.address())))
    }

    /// Allocate a node and compute it for the first time.
    ///
    /// Nodes created with no body running are roots.
    fn create(&mut self, node: &NodeRef) -> Result<()> {
        let address = node.address().clone();
        let root = self.callers.is_empty();
        trace!(%address, root, "creating choice point");

        self.store
            .upsert(ChoicePoint::new(address.clone(), Rc::clone(node.recipe()), root));
        self.store.mark_created(&address);

        match self.evaluate(&address)? {
            Evaluated::Value(value) => self.store.node_mut(&address)?.set_value(value),
            Evaluated::Params {
                distribution,
                params,
            } => {
                let value = distribution.sample(&params, &mut *self.rng)?;
                let log_likelihood = distribution.log_density(&value, &params)?;
                let choice = self.store.node_mut(&address)?;
                choice.set_value(value);
                if let Some(random) = choice.random_mut() {
                    random.params = params;
                    random.log_likelihood = log_likelihood;
                }
            }
        }
        Ok(())
    }

    /// Run a node's closure with fresh dependency tracking.
    pub(super) fn evaluate(&mut self, address: &Address) -> Result<Evaluated> {
        let node = self.store.node_mut(address)?;
        let recipe = Rc::clone(node.recipe());
        let previous = node.take_dependencies();
        self.store.mark_recomputed(address);

        self.callers.push(address.clone());
        let outcome = match recipe.as_ref() {
            Recipe::Deterministic { body } => body(self).map(Evaluated::Value),
            Recipe::Probabilistic {
                distribution,
                params,
            } => params(self).map(|params| Evaluated::Params {
                distribution: distribution.clone(),
                params,
            }),
        };
        self.callers.pop();
        let outcome = outcome?;

        let stale: Vec<Address> = {
            let node = self
                .store
                .get(address)
                .ok_or_else(|| EngineError::invariant(format!("{address} vanished while running")))?;
            previous
                .into_iter()
                .filter(|dependency| !node.dependencies().contains(dependency))
                .collect()
        };
        for dependency in &stale {
            trace!(%address, %dependency, "dropping stale dependency");
            self.store.retract_edge(dependency, address)?;
        }
        Ok(outcome)
    }

    /// Recompute an existing node in place.
    ///
    /// Deterministic nodes report whether their value changed. Probabilistic
    /// nodes keep their value, pick up new parameters and are rescored; they
    /// never report a change.
    pub(crate) fn recompute(&mut self, address: &Address) -> Result<bool> {
        match self.evaluate(address)? {
            Evaluated::Value(value) => {
                let node = self.store.node_mut(address)?;
                let changed = node.value() != &value;
                if changed {
                    node.set_value(value);
                }
                Ok(changed)
            }
            Evaluated::Params {
                distribution,
                params,
            } => {
                let node = self.store.node_mut(address)?;
                let log_likelihood = distribution.log_density(node.value(), &params)?;
                if let Some(random) = node.random_mut() {
                    random.params = params;
                    random.log_likelihood = log_likelihood;
                }
                Ok(false)
            }
        }
    }
}
