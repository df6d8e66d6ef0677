//! Distribution Descriptors
//!
//! The engine never looks inside a distribution. A probabilistic node only
//! needs three operations from its family:
//!
//! - `sample(params)` draws a fresh value
//! - `log_density(value, params)` scores a value
//! - `propose(old, params)` suggests a new value together with the forward
//!   and backward log-densities of that move
//!
//! A [`Distribution`] bundles those operations as a value. New families are
//! built with [`Distribution::builder`]; the built-in families in
//! [`builtin`] are constructed the same way.

pub mod builtin;

use std::fmt;
use std::rc::Rc;

use rand::RngCore;

use crate::error::{EngineError, Result};
use crate::graph::Value;

pub type SampleFn = dyn Fn(&[Value], &mut dyn RngCore) -> Result<Value>;
pub type LogDensityFn = dyn Fn(&Value, &[Value]) -> Result<f64>;
pub type ProposeFn = dyn Fn(&Value, &[Value], &mut dyn RngCore) -> Result<Proposal>;

/// A proposed move away from an old value.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub value: Value,
    /// Log-density of proposing `value` from the old value.
    pub forward: f64,
    /// Log-density of proposing the old value back from `value`.
    pub backward: f64,
}

struct Descriptor {
    name: String,
    sample: Box<SampleFn>,
    log_density: Box<LogDensityFn>,
    propose: Option<Box<ProposeFn>>,
}

/// A pluggable distribution family. Cheap to clone.
#[derive(Clone)]
pub struct Distribution {
    inner: Rc<Descriptor>,
}

impl Distribution {
    /// Start describing a new family.
    pub fn builder(name: impl Into<String>) -> DistributionBuilder {
        DistributionBuilder {
            name: name.into(),
            sample: None,
            log_density: None,
            propose: None,
        }
    }

    fn from_parts(
        name: String,
        sample: Box<SampleFn>,
        log_density: Box<LogDensityFn>,
        propose: Option<Box<ProposeFn>>,
    ) -> Self {
        Self {
            inner: Rc::new(Descriptor {
                name,
                sample,
                log_density,
                propose,
            }),
        }
    }

    /// Family name, used in error messages.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Draw a value.
    pub fn sample(&self, params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
        (self.inner.sample)(params, rng)
    }

    /// Log density of `value`.
    pub fn log_density(&self, value: &Value, params: &[Value]) -> Result<f64> {
        (self.inner.log_density)(value, params)
    }

    /// Propose a move from `old`.
    ///
    /// Families without a custom proposer resample from the prior, so the
    /// forward term is the density of the new value and the backward term
    /// the density of the old one.
    pub fn propose(
        &self,
        old: &Value,
        params: &[Value],
        rng: &mut dyn RngCore,
    ) -> Result<Proposal> {
        if let Some(propose) = &self.inner.propose {
            return propose(old, params, rng);
        }
        let value = self.sample(params, rng)?;
        let forward = self.log_density(&value, params)?;
        let backward = self.log_density(old, params)?;
        Ok(Proposal {
            value,
            forward,
            backward,
        })
    }
}

impl fmt::Debug for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distribution")
            .field("name", &self.inner.name)
            .field("custom_proposal", &self.inner.propose.is_some())
            .finish()
    }
}

/// Factory for [`Distribution`] values.
pub struct DistributionBuilder {
    name: String,
    sample: Option<Box<SampleFn>>,
    log_density: Option<Box<LogDensityFn>>,
    propose: Option<Box<ProposeFn>>,
}

impl DistributionBuilder {
    /// Set the sampling operation.
    pub fn sample<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value], &mut dyn RngCore) -> Result<Value> + 'static,
    {
        self.sample = Some(Box::new(f));
        self
    }

    /// Set the log density operation.
    pub fn log_density<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<f64> + 'static,
    {
        self.log_density = Some(Box::new(f));
        self
    }

    /// Optional; defaults to resampling from the prior.
    pub fn propose<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &[Value], &mut dyn RngCore) -> Result<Proposal> + 'static,
    {
        self.propose = Some(Box::new(f));
        self
    }

    /// Finish the descriptor. `sample` and `log_density` are required.
    pub fn build(self) -> Result<Distribution> {
        let sample = self.sample.ok_or_else(|| {
            EngineError::config(format!("distribution `{}` has no sample operation", self.name))
        })?;
        let log_density = self.log_density.ok_or_else(|| {
            EngineError::config(format!(
                "distribution `{}` has no log-density operation",
                self.name
            ))
        })?;
        Ok(Distribution::from_parts(
            self.name,
            sample,
            log_density,
            self.propose,
        ))
    }
}
