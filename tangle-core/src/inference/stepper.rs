//! Metropolis-Hastings Step
//!
//! One step is a transaction against a committed trace:
//!
//! 1. Open a scratch store over the trace
//! 2. Ask the selected node's distribution for a move and install it
//! 3. Propagate to everything that read the node
//! 4. Collect the nodes the new execution no longer reaches
//! 5. Score the move and let the acceptor decide
//!
//! An accepted step hands back the store's change set for the caller to
//! commit; a rejected step drops the store and the trace is untouched.
//!
//! # Scoring
//!
//! Only nodes the step touched can change their likelihood, so `before` and
//! `after` sum over the recomputed and removed nodes instead of the whole
//! trace. When the move creates or removes random choices, the newly
//! created ones were drawn from their prior and the removed ones would have
//! to be drawn from theirs on the way back; their log-likelihoods enter the
//! forward and backward proposal densities respectively. Conditioned nodes
//! are fixed, never drawn, and stay out of those structural terms.

use indexmap::IndexSet;
use rand::RngCore;
use tracing::debug;

use super::acceptor::{AcceptanceTerms, Acceptor};
use super::selection::Selection;
use crate::engine::Context;
use crate::error::{EngineError, Result};
use crate::graph::{Address, ChangeSet, ChoiceLookup, ChoiceMap, Recipe};

/// Result of one step.
#[derive(Debug)]
pub enum StepOutcome {
    Accepted {
        /// Writes to commit onto the trace the step started from.
        changes: ChangeSet,
        /// No node was created or removed.
        same_topology: bool,
        /// The adjusted selection distribution, when topology changed.
        selection: Option<Selection>,
        terms: AcceptanceTerms,
    },
    Rejected,
}

impl StepOutcome {
    /// Whether the step should be committed.
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepOutcome::Accepted { .. })
    }
}

/// Run one proposal against `committed`, perturbing `selected`.
pub fn step<A>(
    committed: &ChoiceMap,
    selected: &Address,
    selection: &Selection,
    acceptor: &mut A,
    rng: &mut dyn RngCore,
) -> Result<StepOutcome>
where
    A: Acceptor + ?Sized,
{
    let node = committed
        .get(selected)
        .ok_or_else(|| EngineError::invariant(format!("selected node {selected} is not in the trace")))?;
    let distribution = match node.recipe().as_ref() {
        Recipe::Probabilistic { distribution, .. } => distribution.clone(),
        Recipe::Deterministic { .. } => {
            return Err(EngineError::invariant(format!(
                "selected node {selected} is deterministic"
            )))
        }
    };
    let params = node
        .random()
        .map(|random| random.params.clone())
        .ok_or_else(|| EngineError::invariant(format!("{selected} has no random state")))?;

    let mut ctx = Context::new(committed, &mut *rng);
    let proposal = distribution.propose(node.value(), &params, ctx.rng())?;
    let log_likelihood = distribution.log_density(&proposal.value, &params)?;
    {
        let choice = ctx.store_mut().node_mut(selected)?;
        choice.set_value(proposal.value);
        if let Some(random) = choice.random_mut() {
            random.log_likelihood = log_likelihood;
        }
    }
    ctx.store_mut().mark_recomputed(selected);

    let seeds = ctx.dependents_of(selected)?;
    match ctx.propagate(seeds) {
        Ok(_) => {}
        Err(err) if err.is_rejection() => {
            debug!(%selected, "program rejected the proposal");
            return Ok(StepOutcome::Rejected);
        }
        Err(err) => return Err(err),
    }
    if ctx.failed() {
        debug!(%selected, "program rejected the proposal");
        return Ok(StepOutcome::Rejected);
    }

    let removed = ctx.collect_garbage()?;
    let store = ctx.into_store();
    let same_topology = store.created().is_empty() && removed.is_empty();

    let touched: IndexSet<&Address> = store.recomputed().iter().chain(removed.iter()).collect();
    let (mut before, mut before_observed) = (0.0, 0.0);
    let (mut after, mut after_observed) = (0.0, 0.0);
    for address in &touched {
        if let Some(node) = committed.lookup(address) {
            before += node.log_likelihood();
            if node.is_conditioned() {
                before_observed += node.log_likelihood();
            }
        }
        if let Some(node) = store.lookup(address) {
            after += node.log_likelihood();
            if node.is_conditioned() {
                after_observed += node.log_likelihood();
            }
        }
    }

    let forward_structure = latent_log_likelihood(&store, store.created());
    let backward_structure = latent_log_likelihood(committed, &removed);

    let proposed_selection =
        (!same_topology).then(|| selection.adjusted(&store, store.created(), &removed));
    let forward_selection = selection.log_prob(selected);
    let backward_selection = proposed_selection
        .as_ref()
        .unwrap_or(selection)
        .log_prob(selected);

    let terms = AcceptanceTerms {
        after,
        before,
        after_observed,
        before_observed,
        total_forward: forward_selection + forward_structure + proposal.forward,
        total_backward: backward_selection + backward_structure + proposal.backward,
    };
    let created = store.created().len();
    let changes = store.into_changes();

    if !acceptor.accept(&terms, rng) {
        debug!(%selected, log_ratio = terms.log_ratio(), "rejected");
        return Ok(StepOutcome::Rejected);
    }
    debug!(
        %selected,
        log_ratio = terms.log_ratio(),
        created,
        removed = removed.len(),
        "accepted"
    );
    Ok(StepOutcome::Accepted {
        changes,
        same_topology,
        selection: proposed_selection,
        terms,
    })
}

/// Summed log-likelihood of the unconditioned nodes among `addresses`.
fn latent_log_likelihood<L>(lookup: &L, addresses: &IndexSet<Address>) -> f64
where
    L: ChoiceLookup + ?Sized,
{
    addresses
        .iter()
        .filter_map(|address| lookup.lookup(address))
        .filter(|node| !node.is_conditioned())
        .map(|node| node.log_likelihood())
        .sum()
}
