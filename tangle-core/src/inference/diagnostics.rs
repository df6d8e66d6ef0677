//! Diagnostic reporting.
//!
//! The sampler reports a [`Status`] every `report_interval` steps to a
//! [`DiagnosticSink`]. Sinks are injected; nothing in the sampler depends on
//! what they do with the report.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::graph::Value;

/// Periodic sampler status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    /// Steps taken so far.
    pub step: u64,
    /// Current value of the program's root node.
    pub value: Value,
    /// Total log-likelihood of the current trace.
    pub log_likelihood: f64,
    /// Accepted share of the steps since the last report.
    pub accept_rate: f64,
    /// Share of the steps since the last report that changed topology.
    pub topology_change_rate: f64,
}

pub trait DiagnosticSink {
    fn report(&mut self, status: &Status);
}

impl<F> DiagnosticSink for F
where
    F: FnMut(&Status),
{
    fn report(&mut self, status: &Status) {
        self(status)
    }
}

/// Emits one `tracing` event per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, status: &Status) {
        info!(
            step = status.step,
            value = ?status.value,
            log_likelihood = status.log_likelihood,
            accept_rate = status.accept_rate,
            topology_change_rate = status.topology_change_rate,
            "sampler status"
        );
    }
}

/// Drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _status: &Status) {}
}

/// Keeps every report. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<Status>>>,
}

impl RecordingSink {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every status recorded so far.
    pub fn records(&self) -> Vec<Status> {
        self.records.lock().clone()
    }

    /// Number of statuses recorded.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, status: &Status) {
        self.records.lock().push(status.clone());
    }
}

/// Rolling counters behind each report.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub steps: u64,
    pub accepted: u64,
    pub topology_changes: u64,
}

impl Counters {
    /// Accepted fraction of the counted steps.
    pub fn accept_rate(&self) -> f64 {
        ratio(self.accepted, self.steps)
    }

    /// Fraction of counted steps that changed topology.
    pub fn topology_change_rate(&self) -> f64 {
        ratio(self.topology_changes, self.steps)
    }

    /// Start a new reporting window.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ratio(count: u64, steps: u64) -> f64 {
    if steps == 0 {
        0.0
    } else {
        count as f64 / steps as f64
    }
}
