//! Selection Distribution
//!
//! Picks which random choice the next proposal perturbs. Every proposable
//! node (probabilistic, not conditioned) gets the weight
//!
//! ```text
//! w(n) = sqrt(|{ m : m reachable from n along dependents }|)
//! ```
//!
//! where the reachable set includes `n` itself, so a leaf weighs 1. Nodes
//! with more downstream influence are proposed more often.
//!
//! The distribution is built once from a committed trace and then adjusted
//! arithmetically when a step changes topology: removed nodes are
//! subtracted, and every eligible node upstream of a node whose edges moved
//! is re-weighted against the proposed trace. The running total only ever
//! changes by those differences, and the result equals a fresh build over
//! the proposed trace.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use rand::distributions::{Distribution as _, WeightedIndex};
use rand::{Rng, RngCore};

use crate::config::SelectionMethod;
use crate::error::{EngineError, Result};
use crate::graph::{Address, ChoiceLookup, ChoiceMap, Store};

/// Un-normalized weights over proposable nodes, with their running total.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    weights: IndexMap<Address, f64>,
    total: f64,
}

impl Selection {
    /// Build from scratch over every proposable node of `choices`.
    pub fn build(choices: &ChoiceMap) -> Self {
        let mut selection = Self::default();
        for (address, node) in choices.iter() {
            if node.is_proposable() {
                selection.insert(address.clone(), weight_of(choices, address));
            }
        }
        selection
    }

    /// Build from explicit `(address, weight)` entries.
    pub fn from_weights<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Address, f64)>,
    {
        let mut selection = Self::default();
        for (address, weight) in entries {
            selection.insert(address, weight);
        }
        selection
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, address: Address, weight: f64) {
        if let Some(old) = self.weights.insert(address, weight) {
            self.total -= old;
        }
        self.total += weight;
    }

    /// Remove an entry, returning its weight.
    pub fn remove(&mut self, address: &Address) -> Option<f64> {
        let weight = self.weights.shift_remove(address)?;
        self.total -= weight;
        Some(weight)
    }

    /// The distribution after a topology-changing step.
    ///
    /// `removed` nodes are dropped. Any node whose reachable set may have
    /// changed gets its weight recomputed in `store`: the created, removed
    /// and recomputed nodes, and everything upstream of them along
    /// `dependencies` in either the proposed or the original trace.
    pub fn adjusted(
        &self,
        store: &Store<'_>,
        created: &IndexSet<Address>,
        removed: &IndexSet<Address>,
    ) -> Self {
        let mut next = self.clone();
        for address in removed {
            next.remove(address);
        }
        let seeds = created.iter().chain(removed).chain(store.recomputed());
        for address in upstream(store, seeds) {
            match store.get(&address) {
                Some(node) if node.is_proposable() => {
                    let weight = weight_of(store, &address);
                    next.insert(address, weight);
                }
                _ => {
                    next.remove(&address);
                }
            }
        }
        next
    }

    /// Weight of `address`, if it is eligible.
    pub fn weight(&self, address: &Address) -> Option<f64> {
        self.weights.get(address).copied()
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Number of eligible nodes.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether no node is eligible.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, f64)> {
        self.weights.iter().map(|(address, weight)| (address, *weight))
    }

    /// Log-probability of selecting `address`; `-inf` when it is not eligible.
    pub fn log_prob(&self, address: &Address) -> f64 {
        match self.weights.get(address) {
            Some(weight) if self.total > 0.0 => (weight / self.total).ln(),
            _ => f64::NEG_INFINITY,
        }
    }

    /// Pre-sample `size` selections.
    pub fn draw_batch(
        &self,
        size: usize,
        method: SelectionMethod,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Address>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let addresses: Vec<&Address> = self.weights.keys().collect();
        let indices = match method {
            SelectionMethod::Cumulative => {
                let index = WeightedIndex::new(self.weights.values())
                    .map_err(|e| EngineError::config(format!("selection weights: {e}")))?;
                (0..size).map(|_| index.sample(rng)).collect::<Vec<_>>()
            }
            SelectionMethod::Alias => {
                let table = AliasTable::new(self.weights.values().copied())?;
                (0..size).map(|_| table.sample(rng)).collect()
            }
        };
        Ok(indices.into_iter().map(|i| addresses[i].clone()).collect())
    }
}

/// Selection weight of `address` in `lookup`.
pub fn weight_of<L>(lookup: &L, address: &Address) -> f64
where
    L: ChoiceLookup + ?Sized,
{
    (reachable_count(lookup, address) as f64).sqrt()
}

/// Number of nodes reachable from `address` along `dependents`, itself included.
fn reachable_count<L>(lookup: &L, address: &Address) -> usize
where
    L: ChoiceLookup + ?Sized,
{
    let mut seen = IndexSet::new();
    let mut queue = VecDeque::new();
    seen.insert(address.clone());
    queue.push_back(address.clone());
    while let Some(current) = queue.pop_front() {
        let Some(node) = lookup.lookup(&current) else {
            continue;
        };
        for dependent in node.dependents() {
            if seen.insert(dependent.clone()) {
                queue.push_back(dependent.clone());
            }
        }
    }
    seen.len()
}

/// `seeds` and every node that can reach one of them along `dependents`,
/// walking `dependencies` in both the proposed trace and its base.
fn upstream<'s, I>(store: &Store<'_>, seeds: I) -> IndexSet<Address>
where
    I: IntoIterator<Item = &'s Address>,
{
    let mut seen = IndexSet::new();
    let mut queue = VecDeque::new();
    for seed in seeds {
        if seen.insert(seed.clone()) {
            queue.push_back(seed.clone());
        }
    }
    while let Some(current) = queue.pop_front() {
        let proposed = store.get(&current).map(|node| node.dependencies());
        let original = store.base().get(&current).map(|node| node.dependencies());
        for dependency in proposed.into_iter().chain(original).flatten() {
            if seen.insert(dependency.clone()) {
                queue.push_back(dependency.clone());
            }
        }
    }
    seen
}

/// Vose's alias table.
struct AliasTable {
    probability: Vec<f64>,
    alias: Vec<usize>,
}

impl AliasTable {
    fn new<I>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let weights: Vec<f64> = weights.into_iter().collect();
        let n = weights.len();
        let total: f64 = weights.iter().sum();
        if n == 0 || !total.is_finite() || total <= 0.0 || weights.iter().any(|w| *w < 0.0) {
            return Err(EngineError::config(
                "alias table needs finite, non-negative weights with a positive sum",
            ));
        }

        let mut scaled: Vec<f64> = weights.iter().map(|w| w * n as f64 / total).collect();
        let mut probability = vec![1.0; n];
        let mut alias: Vec<usize> = (0..n).collect();
        let (mut small, mut large): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| scaled[i] < 1.0);

        while let (Some(s), Some(&l)) = (small.pop(), large.last()) {
            probability[s] = scaled[s];
            alias[s] = l;
            scaled[l] -= 1.0 - scaled[s];
            if scaled[l] < 1.0 {
                large.pop();
                small.push(l);
            }
        }
        // leftovers are 1 up to rounding
        Ok(Self { probability, alias })
    }

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let column = rng.gen_range(0..self.probability.len());
        if rng.gen::<f64>() < self.probability[column] {
            column
        } else {
            self.alias[column]
        }
    }
}
