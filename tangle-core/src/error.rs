//! Error types for the Tangle engine.

use thiserror::Error;

use crate::graph::{Address, Value};

/// Errors raised while evaluating programs or running inference.
///
/// Only [`EngineError::ProgramRejection`] is expected during normal
/// operation: the stepper turns it into a rejected proposal and the trace
/// initializer retries on it. Every other variant is fatal and reaches the
/// caller unchanged.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The program called `trace_failure` (hard constraint violated).
    #[error("program rejected the current execution")]
    ProgramRejection,

    /// A conditioned node was re-conditioned to a different value.
    #[error("conditioning conflict at {address}: fixed to {existing:?}, observed {observed:?}")]
    ConditioningConflict {
        address: Address,
        existing: Value,
        observed: Value,
    },

    /// Malformed descriptor, bad parameters, dimension mismatch or bad config.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The choice graph broke one of its structural invariants.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The trace initializer hit its attempt cap.
    #[error("no valid execution found after {0} attempts")]
    InitializationExhausted(usize),
}

impl EngineError {
    /// Whether this error is a program-level rejection rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, EngineError::ProgramRejection)
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
