//! Drivers
//!
//! Entry points composed from the initializer and the sampler core:
//!
//! - [`sample`]: exact MH, as a lazy sequence of root values
//! - [`anneal`]: simulated annealing over a schedule of phases
//! - [`annealed_importance`]: one weighted chain of annealed importance
//!   sampling
//!
//! Each phase of a schedule runs its own sampler and hands its final trace
//! to the next.

use rand::RngCore;
use tracing::debug;

use super::acceptor::{Acceptor, AnnealingAcceptor, StandardAcceptor, TemperedAcceptor};
use super::init::{initialize, Trace};
use super::sampler::{Sample, Sampler};
use crate::config::{AnnealingSchedule, SamplerConfig};
use crate::engine::Program;
use crate::error::{EngineError, Result};
use crate::graph::Value;

/// Initialize `program` and sample it with exact MH.
///
/// The returned iterator is unbounded and borrows `rng` until dropped;
/// take as many values as needed.
pub fn sample<'r, P, R>(
    program: &P,
    rng: &'r mut R,
    config: &SamplerConfig,
) -> Result<impl Iterator<Item = Result<Value>> + 'r>
where
    P: Program + ?Sized,
    R: RngCore,
{
    config.validate()?;
    let trace = initialize(program, &mut *rng, config.max_init_attempts)?;
    let sampler = Sampler::new(trace, StandardAcceptor, rng, config.clone());
    Ok(sampler.map(|sample| sample.map(|s| s.value)))
}

/// Simulated annealing. Returns the root value after every step of every
/// phase.
pub fn anneal<P, R>(
    program: &P,
    schedule: &AnnealingSchedule,
    rng: &mut R,
    config: &SamplerConfig,
) -> Result<Vec<Value>>
where
    P: Program + ?Sized,
    R: RngCore,
{
    let samples = anneal_samples(program, schedule, rng, config)?;
    Ok(samples.into_iter().map(|s| s.value).collect())
}

/// [`anneal`], keeping the full snapshots.
pub fn anneal_samples<P, R>(
    program: &P,
    schedule: &AnnealingSchedule,
    rng: &mut R,
    config: &SamplerConfig,
) -> Result<Vec<Sample>>
where
    P: Program + ?Sized,
    R: RngCore,
{
    config.validate()?;
    schedule.validate()?;
    let mut trace = initialize(program, &mut *rng, config.max_init_attempts)?;
    let mut samples = Vec::with_capacity(schedule.total_steps());
    for phase in schedule.phases() {
        let acceptor = AnnealingAcceptor::new(phase.inverse_temperature);
        trace = run_phase(trace, acceptor, &mut *rng, config, phase.steps, &mut samples)?;
    }
    Ok(samples)
}

/// One chain of annealed importance sampling.
#[derive(Debug, Clone)]
pub struct ImportanceRun {
    /// Every sample of every phase.
    pub samples: Vec<Sample>,
    /// Log importance weight of the chain's final state.
    pub log_weight: f64,
}

/// Annealed importance sampling along `prior · likelihood^β`.
///
/// The chain starts at `β = 0` from the initializer's trace. Before each
/// phase the weight picks up `(β_k − β_{k−1}) · log L(x)` for the current
/// trace, where `L` is the likelihood of the conditioned nodes; then the
/// phase's steps run with [`TemperedAcceptor`] at `β_k`. The schedule must
/// climb within `[0, 1]` and end at 1.
pub fn annealed_importance<P, R>(
    program: &P,
    schedule: &AnnealingSchedule,
    rng: &mut R,
    config: &SamplerConfig,
) -> Result<ImportanceRun>
where
    P: Program + ?Sized,
    R: RngCore,
{
    config.validate()?;
    schedule.validate_for_importance()?;
    let mut trace = initialize(program, &mut *rng, config.max_init_attempts)?;
    let mut samples = Vec::with_capacity(schedule.total_steps());
    let mut log_weight = 0.0;
    let mut previous = 0.0;
    for phase in schedule.phases() {
        let beta = phase.inverse_temperature;
        log_weight += (beta - previous) * trace.choices.observed_log_likelihood();
        previous = beta;
        trace = run_phase(
            trace,
            TemperedAcceptor::new(beta),
            &mut *rng,
            config,
            phase.steps,
            &mut samples,
        )?;
    }
    debug!(log_weight, "importance chain finished");
    Ok(ImportanceRun {
        samples,
        log_weight,
    })
}

fn run_phase<A>(
    trace: Trace,
    acceptor: A,
    rng: &mut dyn RngCore,
    config: &SamplerConfig,
    steps: usize,
    samples: &mut Vec<Sample>,
) -> Result<Trace>
where
    A: Acceptor,
{
    let mut sampler = Sampler::new(trace, acceptor, rng, config.clone());
    for _ in 0..steps {
        let sample = sampler
            .next()
            .ok_or_else(|| EngineError::invariant("sampler ended early"))??;
        samples.push(sample);
    }
    Ok(sampler.into_trace())
}
