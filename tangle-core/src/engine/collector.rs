//! Garbage Collection
//!
//! A non-root node with no dependents can no longer be reached from the
//! program's result. Such nodes are queued as "possibly removed" when their
//! last incoming read is retracted; the collector drains that queue,
//! deleting each orphan and retracting its own outgoing reads, which may
//! orphan further nodes in turn.
//!
//! A candidate is skipped if it was picked up again (it has dependents), if
//! it is a root, or if it is already gone.

use indexmap::IndexSet;
use tracing::trace;

use super::context::Context;
use crate::error::{EngineError, Result};
use crate::graph::Address;

impl Context<'_> {
    /// Delete every orphaned node. Returns the removed addresses.
    pub fn collect_garbage(&mut self) -> Result<IndexSet<Address>> {
        let mut removed = IndexSet::new();
        while let Some(candidate) = self.store.pop_possibly_removed() {
            let orphaned = self
                .store
                .get(&candidate)
                .is_some_and(|node| !node.is_root() && node.dependents().is_empty());
            if !orphaned {
                continue;
            }

            let node = self.store.remove(&candidate).ok_or_else(|| {
                EngineError::invariant(format!("collected node {candidate} disappeared"))
            })?;
            trace!(address = %candidate, "collected");
            for dependency in node.dependencies() {
                self.store.retract_edge(dependency, &candidate)?;
            }
            removed.insert(candidate);
        }
        Ok(removed)
    }
}
