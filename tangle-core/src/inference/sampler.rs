//! Sampler Core
//!
//! A [`Sampler`] is a pull-based iterator over MH steps. Nothing runs until
//! the next element is requested; stopping is simply not asking again, and
//! [`Sampler::into_trace`] hands the current state on to another sampler
//! (the next annealing phase, say).
//!
//! # Implementation
//!
//! The committed trace is an `Rc<ChoiceMap>`. Every yielded [`Sample`]
//! shares it, and an accepted step commits with `Rc::make_mut`, so the map
//! is only copied when a consumer still holds an older sample.
//!
//! Selection targets are drawn in batches. A batch is consumed front to
//! back and redrawn when it runs out or when a step changes topology.

use std::collections::VecDeque;
use std::rc::Rc;

use rand::RngCore;
use tracing::warn;

use super::acceptor::Acceptor;
use super::diagnostics::{Counters, DiagnosticSink, Status, TracingSink};
use super::init::Trace;
use super::selection::Selection;
use super::stepper::{step, StepOutcome};
use crate::config::SamplerConfig;
use crate::error::Result;
use crate::graph::{Address, ChoiceMap, Value};

/// One element of a sample sequence.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Value of the program's root node.
    pub value: Value,
    /// Snapshot of every choice point.
    pub choices: Rc<ChoiceMap>,
}

/// Lazy, unbounded sequence of MH samples.
///
/// Yields `Err` at most once: after a fatal error the sampler is exhausted.
pub struct Sampler<A, R> {
    root: Address,
    choices: Rc<ChoiceMap>,
    acceptor: A,
    rng: R,
    config: SamplerConfig,
    selection: Option<Selection>,
    batch: VecDeque<Address>,
    sink: Box<dyn DiagnosticSink>,
    counters: Counters,
    steps: u64,
    warned_empty: bool,
    halted: bool,
}

impl<A, R> Sampler<A, R>
where
    A: Acceptor,
    R: RngCore,
{
    /// Start a chain at `trace`. The selection is built on the first step.
    pub fn new(trace: Trace, acceptor: A, rng: R, config: SamplerConfig) -> Self {
        Self {
            root: trace.root,
            choices: trace.choices,
            acceptor,
            rng,
            config,
            selection: None,
            batch: VecDeque::new(),
            sink: Box::new(TracingSink),
            counters: Counters::default(),
            steps: 0,
            warned_empty: false,
            halted: false,
        }
    }

    /// Replace the diagnostic sink.
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// The current state, as a restartable trace.
    pub fn trace(&self) -> Trace {
        Trace {
            root: self.root.clone(),
            choices: Rc::clone(&self.choices),
        }
    }

    /// Hand the current state on, e.g. to the next annealing phase.
    pub fn into_trace(self) -> Trace {
        Trace {
            root: self.root,
            choices: self.choices,
        }
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Adjust the acceptor between steps.
    pub fn acceptor_mut(&mut self) -> &mut A {
        &mut self.acceptor
    }

    fn advance(&mut self) -> Result<Sample> {
        let outcome = match self.next_target()? {
            Some(selected) => {
                let selection = self.selection.get_or_insert_with(Selection::default);
                step(
                    &self.choices,
                    &selected,
                    selection,
                    &mut self.acceptor,
                    &mut self.rng,
                )?
            }
            None => StepOutcome::Rejected,
        };

        self.steps += 1;
        self.counters.steps += 1;
        if let StepOutcome::Accepted {
            changes,
            same_topology,
            selection,
            ..
        } = outcome
        {
            Rc::make_mut(&mut self.choices).apply(changes);
            self.counters.accepted += 1;
            if !same_topology {
                self.counters.topology_changes += 1;
                self.batch.clear();
                if let Some(selection) = selection {
                    self.selection = Some(selection);
                }
            }
            if self.config.verify_invariants {
                self.choices.verify_invariants()?;
            }
        }

        let value = self.choices.value(&self.root)?.clone();
        let interval = self.config.report_interval;
        if interval != 0 && self.steps % interval == 0 {
            self.report(&value);
        }
        Ok(Sample {
            value,
            choices: Rc::clone(&self.choices),
        })
    }

    /// Next node to perturb, or `None` when nothing is proposable.
    fn next_target(&mut self) -> Result<Option<Address>> {
        let selection = self
            .selection
            .get_or_insert_with(|| Selection::build(&self.choices));
        if selection.is_empty() {
            if !self.warned_empty {
                warn!("no proposable choice points; every step is a no-op");
                self.warned_empty = true;
            }
            return Ok(None);
        }
        if self.batch.is_empty() {
            let draws = selection.draw_batch(
                self.config.batch_size,
                self.config.selection_method,
                &mut self.rng,
            )?;
            self.batch.extend(draws);
        }
        Ok(self.batch.pop_front())
    }

    fn report(&mut self, value: &Value) {
        let status = Status {
            step: self.steps,
            value: value.clone(),
            log_likelihood: self.choices.log_likelihood(),
            accept_rate: self.counters.accept_rate(),
            topology_change_rate: self.counters.topology_change_rate(),
        };
        self.sink.report(&status);
        self.counters.reset();
    }
}

impl<A, R> Iterator for Sampler<A, R>
where
    A: Acceptor,
    R: RngCore,
{
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }
        let item = self.advance();
        if item.is_err() {
            self.halted = true;
        }
        Some(item)
    }
}
