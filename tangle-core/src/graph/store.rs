//! Choice Maps and Scratch Stores
//!
//! A [`ChoiceMap`] is the committed set of choice points of one trace. A
//! [`Store`] is the mutable container an evaluation context works in: a
//! copy-on-write overlay on top of a committed map. Writes land in the
//! overlay; reads fall through to the base. Committing a store hands back
//! its [`ChangeSet`]; discarding it leaves the base untouched.
//!
//! Both views implement [`ChoiceLookup`] so that likelihood sums and
//! selection weights can be computed against either the original or the
//! proposed trace.

use indexmap::{IndexMap, IndexSet};

use super::address::Address;
use super::node::ChoicePoint;
use super::value::Value;
use crate::error::{EngineError, Result};

/// Read-only access to choice points by address.
pub trait ChoiceLookup {
    fn lookup(&self, address: &Address) -> Option<&ChoicePoint>;

    /// Log-likelihood of `address`, zero when absent or deterministic.
    fn log_likelihood_of(&self, address: &Address) -> f64 {
        self.lookup(address).map_or(0.0, ChoicePoint::log_likelihood)
    }
}

/// The committed choice points of one trace.
#[derive(Debug, Clone, Default)]
pub struct ChoiceMap {
    nodes: IndexMap<Address, ChoicePoint>,
}

impl ChoiceMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a committed node.
    pub fn get(&self, address: &Address) -> Option<&ChoicePoint> {
        self.nodes.get(address)
    }

    /// Whether `address` is committed.
    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains_key(address)
    }

    /// Current value of a node.
    pub fn value(&self, address: &Address) -> Result<&Value> {
        self.nodes
            .get(address)
            .map(ChoicePoint::value)
            .ok_or_else(|| EngineError::invariant(format!("no choice point at {address}")))
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &ChoicePoint)> {
        self.nodes.iter()
    }

    /// Number of committed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is committed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of the cached log-likelihoods of every probabilistic node.
    pub fn log_likelihood(&self) -> f64 {
        self.nodes.values().map(ChoicePoint::log_likelihood).sum()
    }

    /// Sum over conditioned nodes only.
    pub fn observed_log_likelihood(&self) -> f64 {
        self.nodes
            .values()
            .filter(|node| node.is_conditioned())
            .map(ChoicePoint::log_likelihood)
            .sum()
    }

    /// Apply a committed change set.
    pub fn apply(&mut self, changes: ChangeSet) {
        for (address, entry) in changes.entries {
            match entry {
                Some(node) => {
                    self.nodes.insert(address, node);
                }
                None => {
                    self.nodes.swap_remove(&address);
                }
            }
        }
    }

    /// Check the structural invariants of a committed trace.
    ///
    /// - every name in a `dependents`/`dependencies` set exists;
    /// - `b ∈ dependents(a) ⇔ a ∈ dependencies(b)`;
    /// - every non-root node has at least one dependent.
    pub fn verify_invariants(&self) -> Result<()> {
        for (address, node) in &self.nodes {
            if node.address() != address {
                return Err(EngineError::invariant(format!(
                    "node {} stored under {address}",
                    node.address()
                )));
            }
            for dependent in node.dependents() {
                let other = self.nodes.get(dependent).ok_or_else(|| {
                    EngineError::invariant(format!("{address} lists missing dependent {dependent}"))
                })?;
                if !other.dependencies().contains(address) {
                    return Err(EngineError::invariant(format!(
                        "{dependent} is a dependent of {address} but does not depend on it"
                    )));
                }
            }
            for dependency in node.dependencies() {
                let other = self.nodes.get(dependency).ok_or_else(|| {
                    EngineError::invariant(format!(
                        "{address} depends on missing node {dependency}"
                    ))
                })?;
                if !other.dependents().contains(address) {
                    return Err(EngineError::invariant(format!(
                        "{address} depends on {dependency} which does not list it"
                    )));
                }
            }
            if !node.is_root() && node.dependents().is_empty() {
                return Err(EngineError::invariant(format!(
                    "{address} is unreachable: no dependents and not a root"
                )));
            }
        }
        Ok(())
    }
}

impl ChoiceLookup for ChoiceMap {
    fn lookup(&self, address: &Address) -> Option<&ChoicePoint> {
        self.nodes.get(address)
    }
}

/// Writes made by a store, ready to be applied to its base.
///
/// `None` marks a deletion.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: IndexMap<Address, Option<ChoicePoint>>,
}

impl ChangeSet {
    /// Number of written or deleted nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the step touched nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Mutable container for one evaluation context.
#[derive(Debug)]
pub struct Store<'a> {
    base: &'a ChoiceMap,

    changes: IndexMap<Address, Option<ChoicePoint>>,

    /// Names recomputed in this context.
    recomputed: IndexSet<Address>,

    /// Names created in this context.
    created: IndexSet<Address>,

    /// Names whose last dependent went away; candidates for collection.
    possibly_removed: IndexSet<Address>,

    /// Set by `trace_failure`.
    failed: bool,
}

impl<'a> Store<'a> {
    /// A scratch store seeded with the committed choice points of `base`.
    pub fn new(base: &'a ChoiceMap) -> Self {
        Self {
            base,
            changes: IndexMap::new(),
            recomputed: IndexSet::new(),
            created: IndexSet::new(),
            possibly_removed: IndexSet::new(),
            failed: false,
        }
    }

    /// The committed map this store is layered on.
    pub fn base(&self) -> &'a ChoiceMap {
        self.base
    }

    /// Look up a node, preferring the overlay.
    pub fn get(&self, address: &Address) -> Option<&ChoicePoint> {
        match self.changes.get(address) {
            Some(entry) => entry.as_ref(),
            None => self.base.get(address),
        }
    }

    /// Whether `address` exists after this step's writes.
    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Mutable access, copying the node out of the base on first write.
    pub fn get_mut(&mut self, address: &Address) -> Option<&mut ChoicePoint> {
        if !self.changes.contains_key(address) {
            let node = self.base.get(address)?.clone();
            self.changes.insert(address.clone(), Some(node));
        }
        self.changes.get_mut(address).and_then(Option::as_mut)
    }

    pub(crate) fn node_mut(&mut self, address: &Address) -> Result<&mut ChoicePoint> {
        self.get_mut(address)
            .ok_or_else(|| EngineError::invariant(format!("no choice point at {address}")))
    }

    /// Insert or replace a node.
    pub fn upsert(&mut self, node: ChoicePoint) {
        self.changes.insert(node.address().clone(), Some(node));
    }

    /// Delete a node, returning it.
    pub fn remove(&mut self, address: &Address) -> Option<ChoicePoint> {
        let node = match self.changes.get_mut(address) {
            Some(entry) => entry.take(),
            None => self.base.get(address).cloned(),
        };
        if node.is_some() {
            self.changes.insert(address.clone(), None);
        }
        node
    }

    /// Add a dependency edge: `dependent` read `dependency`.
    pub fn add_edge(&mut self, dependency: &Address, dependent: &Address) -> Result<()> {
        self.node_mut(dependency)?.add_dependent(dependent.clone());
        self.node_mut(dependent)?.add_dependency(dependency.clone());
        Ok(())
    }

    /// Retract the edge `dependent` → `dependency`.
    ///
    /// The dependency side must list the dependent. The dependent side may
    /// already have forgotten the edge (its dependency set was rebuilt) or be
    /// gone entirely (it was just collected). When the dependency loses its
    /// last dependent it becomes a collection candidate.
    pub fn retract_edge(&mut self, dependency: &Address, dependent: &Address) -> Result<()> {
        let node = self.node_mut(dependency)?;
        if !node.remove_dependent(dependent) {
            return Err(EngineError::invariant(format!(
                "retracting nonexistent edge {dependent} -> {dependency}"
            )));
        }
        let orphaned = node.dependents().is_empty() && !node.is_root();
        if orphaned {
            self.possibly_removed.insert(dependency.clone());
        }
        if let Some(node) = self.get_mut(dependent) {
            node.remove_dependency(dependency);
        }
        Ok(())
    }

    /// Record that `address` was re-run this step.
    pub fn mark_recomputed(&mut self, address: &Address) {
        self.recomputed.insert(address.clone());
    }

    /// Record that `address` was created this step.
    pub fn mark_created(&mut self, address: &Address) {
        self.created.insert(address.clone());
    }

    /// Queue `address` for collection.
    pub fn mark_possibly_removed(&mut self, address: &Address) {
        self.possibly_removed.insert(address.clone());
    }

    /// Nodes re-run this step.
    pub fn recomputed(&self) -> &IndexSet<Address> {
        &self.recomputed
    }

    /// Nodes created this step.
    pub fn created(&self) -> &IndexSet<Address> {
        &self.created
    }

    /// Collection candidates still queued.
    pub fn possibly_removed(&self) -> &IndexSet<Address> {
        &self.possibly_removed
    }

    pub(crate) fn pop_possibly_removed(&mut self) -> Option<Address> {
        self.possibly_removed.shift_remove_index(0)
    }

    /// Whether a trace failure was raised.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn set_failed(&mut self) {
        self.failed = true;
    }

    /// Hand back the overlay for committing.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet {
            entries: self.changes,
        }
    }
}

impl ChoiceLookup for Store<'_> {
    fn lookup(&self, address: &Address) -> Option<&ChoicePoint> {
        self.get(address)
    }
}
