//! Evaluation Context
//!
//! The context is the explicit stand-in for "the current store": every
//! program and every node body receives `&mut Context` and reaches the
//! choice graph only through it.
//!
//! # Implementation
//!
//! The context owns a scratch [`Store`] layered on a committed map, the
//! random source shared by all draws, and a caller stack. When a node's
//! body runs, the node's address is pushed onto the stack; reads made while
//! it is on top register edges to it, and nodes created while it is on top
//! are addressed underneath it. The stack is popped on every exit path,
//! including errors, so nested recomputes always unwind cleanly.

use std::rc::Rc;

use rand::RngCore;

use crate::distribution::Distribution;
use crate::error::{EngineError, Result};
use crate::graph::{Address, ChoiceMap, NodeRef, Params, Recipe, Segment, Store, Value};

/// A stochastic program: run inside a fresh context, returns its root node.
pub trait Program {
    fn run(&self, ctx: &mut Context<'_>) -> Result<NodeRef>;
}

impl<F> Program for F
where
    F: Fn(&mut Context<'_>) -> Result<NodeRef>,
{
    fn run(&self, ctx: &mut Context<'_>) -> Result<NodeRef> {
        self(ctx)
    }
}

/// The single live store of one evaluation, plus its caller stack.
pub struct Context<'a> {
    pub(super) store: Store<'a>,
    pub(super) rng: &'a mut dyn RngCore,
    pub(super) callers: Vec<Address>,
}

impl<'a> Context<'a> {
    /// Open a context whose store is layered on `base`.
    pub fn new(base: &'a ChoiceMap, rng: &'a mut dyn RngCore) -> Self {
        Self {
            store: Store::new(base),
            rng,
            callers: Vec::new(),
        }
    }

    /// The scratch store being written.
    pub fn store(&self) -> &Store<'a> {
        &self.store
    }

    /// Mutable access to the scratch store.
    pub fn store_mut(&mut self) -> &mut Store<'a> {
        &mut self.store
    }

    /// The injected generator.
    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut *self.rng
    }

    /// Close the context, keeping its store.
    pub fn into_store(self) -> Store<'a> {
        self.store
    }

    /// The node whose body is currently running, if any.
    pub fn current_caller(&self) -> Option<&Address> {
        self.callers.last()
    }

    /// Whether reads are being recorded as dependencies right now.
    pub fn is_tracking(&self) -> bool {
        !self.callers.is_empty()
    }

    /// Address new children are created under.
    fn scope(&self) -> Address {
        self.callers.last().cloned().unwrap_or_default()
    }

    /// Reference a probabilistic choice point named `name` in the current
    /// scope, creating and sampling it on first use.
    ///
    /// `params` is the node's parameter closure; it may read other nodes,
    /// which makes this node depend on them.
    pub fn random<F>(
        &mut self,
        name: impl Into<Segment>,
        distribution: &Distribution,
        params: F,
    ) -> Result<NodeRef>
    where
        F: Fn(&mut Context<'_>) -> Result<Params> + 'static,
    {
        let recipe = Recipe::Probabilistic {
            distribution: distribution.clone(),
            params: Rc::new(params),
        };
        let node = NodeRef::new(self.scope().child(name), Rc::new(recipe));
        self.reference(&node)?;
        Ok(node)
    }

    /// [`Context::random`] with parameters that never change.
    pub fn random_with(
        &mut self,
        name: impl Into<Segment>,
        distribution: &Distribution,
        params: Params,
    ) -> Result<NodeRef> {
        self.random(name, distribution, move |_| Ok(params.clone()))
    }

    /// Reference a random choice and read its value in one go.
    pub fn sample<F>(
        &mut self,
        name: impl Into<Segment>,
        distribution: &Distribution,
        params: F,
    ) -> Result<Value>
    where
        F: Fn(&mut Context<'_>) -> Result<Params> + 'static,
    {
        let node = self.random(name, distribution, params)?;
        self.read(&node)
    }

    /// Reference a deterministic choice point whose value is `body`.
    pub fn deterministic<F>(&mut self, name: impl Into<Segment>, body: F) -> Result<NodeRef>
    where
        F: Fn(&mut Context<'_>) -> Result<Value> + 'static,
    {
        let recipe = Recipe::Deterministic {
            body: Rc::new(body),
        };
        let node = NodeRef::new(self.scope().child(name), Rc::new(recipe));
        self.reference(&node)?;
        Ok(node)
    }

    /// Stochastic memoization.
    ///
    /// The node is addressed by `tag` and `args` rather than by the call
    /// path, so every call with equal arguments reaches the same node and
    /// shares the randomness drawn inside `expr`.
    pub fn memo<F>(&mut self, tag: &str, args: &[Value], expr: F) -> Result<NodeRef>
    where
        F: Fn(&mut Context<'_>) -> Result<Value> + 'static,
    {
        let recipe = Recipe::Deterministic {
            body: Rc::new(expr),
        };
        let node = NodeRef::new(Address::memo(tag, args)?, Rc::new(recipe));
        self.reference(&node)?;
        Ok(node)
    }

    /// Fix a probabilistic node to an observed value.
    ///
    /// Conditioning again with the same value is a no-op; a different value
    /// is a [`EngineError::ConditioningConflict`].
    pub fn condition(&mut self, node: &NodeRef, observed: impl Into<Value>) -> Result<Value> {
        let observed = observed.into();
        let current = self.read(node)?;
        let address = node.address().clone();
        let choice = self.store.node_mut(&address)?;
        let distribution = match choice.recipe().as_ref() {
            Recipe::Probabilistic { distribution, .. } => distribution.clone(),
            Recipe::Deterministic { .. } => {
                return Err(EngineError::config(format!(
                    "cannot condition deterministic node {address}"
                )))
            }
        };
        let random = choice
            .random_mut()
            .ok_or_else(|| EngineError::invariant(format!("{address} has no random state")))?;
        if random.conditioned {
            if current == observed {
                return Ok(current);
            }
            return Err(EngineError::ConditioningConflict {
                address,
                existing: current,
                observed,
            });
        }
        random.log_likelihood = distribution.log_density(&observed, &random.params)?;
        random.conditioned = true;
        choice.set_value(observed.clone());
        self.store.mark_recomputed(&address);

        let dependents = self.dependents_of(&address)?;
        self.propagate(dependents)?;
        Ok(observed)
    }

    /// Reject the current execution (a hard constraint failed).
    ///
    /// Marks the store as failed and returns the error to propagate with
    /// `?`. The flag sticks even if the error is swallowed.
    pub fn trace_failure(&mut self) -> EngineError {
        self.store.set_failed();
        EngineError::ProgramRejection
    }

    /// Whether a trace failure was raised so far.
    pub fn failed(&self) -> bool {
        self.store.failed()
    }

    /// Snapshot of the nodes that read `address`.
    pub(crate) fn dependents_of(&self, address: &Address) -> Result<Vec<Address>> {
        self.store
            .get(address)
            .map(|node| node.dependents().iter().cloned().collect())
            .ok_or_else(|| EngineError::invariant(format!("no choice point at {address}")))
    }
}
