//! Change Propagation
//!
//! After a value changes, everything that read it may be out of date. The
//! propagator walks `dependents` breadth-first and recomputes each node it
//! reaches:
//!
//! 1. Seed a FIFO queue with the dependents of the changed node
//! 2. Pop a node and recompute it
//! 3. If it is deterministic and its value actually changed, enqueue its
//!    dependents
//!
//! Probabilistic nodes are rescored but keep their value, so propagation
//! always stops at them. Deterministic nodes whose value comes out equal
//! cut propagation short as well.
//!
//! A node that is already waiting in the queue is not enqueued twice.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use super::context::Context;
use crate::error::{EngineError, Result};
use crate::graph::Address;

impl Context<'_> {
    /// Recompute everything downstream of a change, starting from `seeds`.
    ///
    /// Returns the number of recomputes performed.
    pub fn propagate<I>(&mut self, seeds: I) -> Result<usize>
    where
        I: IntoIterator<Item = Address>,
    {
        let mut queue = VecDeque::new();
        let mut pending = HashSet::new();
        for address in seeds {
            if pending.insert(address.clone()) {
                queue.push_back(address);
            }
        }

        let mut recomputes = 0;
        while let Some(address) = queue.pop_front() {
            pending.remove(&address);
            if !self.store.contains(&address) {
                return Err(EngineError::invariant(format!(
                    "propagation reached missing node {address}"
                )));
            }

            let changed = self.recompute(&address)?;
            recomputes += 1;
            trace!(%address, changed, "recomputed");
            if !changed {
                continue;
            }

            if let Some(node) = self.store.get(&address) {
                for dependent in node.dependents() {
                    if pending.insert(dependent.clone()) {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }

        debug!(recomputes, "propagation settled");
        Ok(recomputes)
    }
}
