//! Acceptance Rules
//!
//! The stepper computes the log-quantities of a proposal and hands them to
//! an [`Acceptor`], which decides. Swapping the acceptor turns the same
//! stepper into an exact posterior sampler, an annealing optimizer, or the
//! transition kernel of one annealed-importance phase.

use rand::{Rng, RngCore};
use serde::Serialize;

/// Log-quantities of one proposal.
///
/// `after`/`before` sum the log-likelihoods of every node the step touched
/// in the proposed and original trace; the `_observed` fields are the
/// conditioned nodes' share of those sums.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcceptanceTerms {
    pub after: f64,
    pub before: f64,
    pub after_observed: f64,
    pub before_observed: f64,
    pub total_forward: f64,
    pub total_backward: f64,
}

impl AcceptanceTerms {
    /// The Metropolis-Hastings log acceptance ratio.
    pub fn log_ratio(&self) -> f64 {
        (self.after - self.before) + (self.total_backward - self.total_forward)
    }

    /// Change in the log-likelihood of the unobserved nodes.
    pub fn latent_delta(&self) -> f64 {
        (self.after - self.after_observed) - (self.before - self.before_observed)
    }

    /// Change in the log-likelihood of the observed nodes.
    pub fn observed_delta(&self) -> f64 {
        self.after_observed - self.before_observed
    }
}

/// Decides whether a proposal is taken.
pub trait Acceptor {
    fn accept(&mut self, terms: &AcceptanceTerms, rng: &mut dyn RngCore) -> bool;
}

impl<F> Acceptor for F
where
    F: FnMut(&AcceptanceTerms, &mut dyn RngCore) -> bool,
{
    fn accept(&mut self, terms: &AcceptanceTerms, rng: &mut dyn RngCore) -> bool {
        self(terms, rng)
    }
}

fn log_uniform(rng: &mut dyn RngCore) -> f64 {
    rng.gen::<f64>().ln()
}

/// Exact Metropolis-Hastings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAcceptor;

impl Acceptor for StandardAcceptor {
    fn accept(&mut self, terms: &AcceptanceTerms, rng: &mut dyn RngCore) -> bool {
        log_uniform(rng) < terms.log_ratio()
    }
}

/// Simulated annealing at a fixed inverse temperature.
///
/// Ignores proposal asymmetry; an optimizer, not a posterior sampler.
#[derive(Debug, Clone, Copy)]
pub struct AnnealingAcceptor {
    pub inverse_temperature: f64,
}

impl AnnealingAcceptor {
    /// Acceptor at inverse temperature `inverse_temperature`.
    pub fn new(inverse_temperature: f64) -> Self {
        Self {
            inverse_temperature,
        }
    }
}

impl Acceptor for AnnealingAcceptor {
    fn accept(&mut self, terms: &AcceptanceTerms, rng: &mut dyn RngCore) -> bool {
        log_uniform(rng) < self.inverse_temperature * (terms.after - terms.before)
    }
}

/// Exact MH targeting `prior · likelihood^beta`.
///
/// Only the observed nodes are tempered.
#[derive(Debug, Clone, Copy)]
pub struct TemperedAcceptor {
    pub beta: f64,
}

impl TemperedAcceptor {
    /// Acceptor for `prior · likelihood^beta`.
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }
}

impl Acceptor for TemperedAcceptor {
    fn accept(&mut self, terms: &AcceptanceTerms, rng: &mut dyn RngCore) -> bool {
        let target = terms.latent_delta() + self.beta * terms.observed_delta();
        log_uniform(rng) < target + (terms.total_backward - terms.total_forward)
    }
}
