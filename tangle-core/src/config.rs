//! Sampler Configuration
//!
//! Settings are plain serde structs so they can be loaded from JSON as well
//! as built in code. Every field has a default; an empty JSON object is a
//! valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// How a batch of selection draws is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Binary search over cumulative weights.
    #[default]
    Cumulative,
    /// Vose's alias method: linear setup, constant-time draws.
    Alias,
}

/// Knobs of the sampler core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Selection draws pre-sampled per batch.
    pub batch_size: usize,

    pub selection_method: SelectionMethod,

    /// Steps between diagnostic reports; counters reset after each.
    pub report_interval: u64,

    /// Cap on trace-initializer attempts. `None` retries forever.
    pub max_init_attempts: Option<usize>,

    /// Check the graph invariants of the committed trace after every
    /// accepted step.
    pub verify_invariants: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            selection_method: SelectionMethod::Cumulative,
            report_interval: 1000,
            max_init_attempts: None,
            verify_invariants: false,
        }
    }
}

impl SamplerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::config(format!("invalid sampler config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the sampler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::config("batch_size must be at least 1"));
        }
        if self.report_interval == 0 {
            return Err(EngineError::config("report_interval must be at least 1"));
        }
        if self.max_init_attempts == Some(0) {
            return Err(EngineError::config("max_init_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// One phase of an annealing schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub inverse_temperature: f64,
    pub steps: usize,
}

/// Ordered list of `(inverse temperature, steps)` phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnealingSchedule {
    phases: Vec<Phase>,
}

impl AnnealingSchedule {
    /// Schedule from `(inverse_temperature, steps)` pairs.
    pub fn new<I>(phases: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, usize)>,
    {
        let schedule = Self {
            phases: phases
                .into_iter()
                .map(|(inverse_temperature, steps)| Phase {
                    inverse_temperature,
                    steps,
                })
                .collect(),
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Parse and validate a JSON schedule.
    pub fn from_json(json: &str) -> Result<Self> {
        let schedule: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::config(format!("invalid annealing schedule: {e}")))?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Phases in run order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Steps summed over all phases.
    pub fn total_steps(&self) -> usize {
        self.phases.iter().map(|phase| phase.steps).sum()
    }

    /// Inverse temperatures must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(EngineError::config("annealing schedule has no phases"));
        }
        for phase in &self.phases {
            let beta = phase.inverse_temperature;
            if !beta.is_finite() || beta < 0.0 {
                return Err(EngineError::config(format!(
                    "inverse temperature {beta} must be finite and non-negative"
                )));
            }
        }
        Ok(())
    }

    /// Stricter check for annealed importance sampling: inverse temperatures
    /// climb from `[0, 1]` and the last phase targets the posterior.
    pub fn validate_for_importance(&self) -> Result<()> {
        self.validate()?;
        let mut previous = 0.0;
        for phase in &self.phases {
            let beta = phase.inverse_temperature;
            if beta > 1.0 {
                return Err(EngineError::config(format!(
                    "importance schedule temperature {beta} exceeds 1"
                )));
            }
            if beta < previous {
                return Err(EngineError::config(format!(
                    "importance schedule decreases from {previous} to {beta}"
                )));
            }
            previous = beta;
        }
        if previous != 1.0 {
            return Err(EngineError::config(
                "importance schedule must end at inverse temperature 1",
            ));
        }
        Ok(())
    }
}
