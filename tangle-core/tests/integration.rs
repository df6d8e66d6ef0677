//! Integration Tests for the Inference Engine
//!
//! These tests run whole programs through the initializer, the sampler and
//! the drivers, and check the resulting sample frequencies against
//! analytic answers.

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use tangle_core::distribution::builtin::{beta, flip, gaussian};
use tangle_core::distribution::{Distribution, Proposal};
use tangle_core::engine::Context;
use tangle_core::graph::{params, Address, NodeRef, Value};
use tangle_core::inference::{
    anneal_samples, annealed_importance, initialize, sample, AcceptanceTerms, Acceptor,
    RecordingSink, Sample, Sampler, StandardAcceptor,
};
use tangle_core::{AnnealingSchedule, EngineError, Result, SamplerConfig, SelectionMethod};

fn quiet() -> SamplerConfig {
    SamplerConfig {
        report_interval: u64::MAX,
        ..SamplerConfig::default()
    }
}

fn checked() -> SamplerConfig {
    SamplerConfig {
        verify_invariants: true,
        ..quiet()
    }
}

fn frequency<I>(values: I) -> f64
where
    I: IntoIterator<Item = bool>,
{
    let (mut hits, mut total) = (0usize, 0usize);
    for v in values {
        total += 1;
        if v {
            hits += 1;
        }
    }
    hits as f64 / total as f64
}

fn is_true(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn at(name: &str) -> Address {
    Address::root().child(name)
}

// =============================================================================
// Standard sampling
// =============================================================================

fn biased_coin(ctx: &mut Context<'_>) -> Result<NodeRef> {
    ctx.random_with("coin", &flip(), params([0.3]))
}

/// A lone coin is sampled at its bias.
#[test]
fn single_flip_matches_its_bias() {
    let mut rng = StdRng::seed_from_u64(2024);
    let values = sample(&biased_coin, &mut rng, &quiet())
        .unwrap()
        .take(100_000)
        .map(|v| is_true(&v.unwrap()));

    let mean = frequency(values);
    assert!((mean - 0.3).abs() < 0.02, "mean = {mean}");
}

/// Two fair coins and a noisy report that at least one came up heads.
fn noisy_or(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let a = ctx.random_with("a", &flip(), params([0.5]))?;
    let b = ctx.random_with("b", &flip(), params([0.5]))?;
    let (ra, rb) = (a.clone(), b.clone());
    let report = ctx.random("report", &flip(), move |c| {
        let any = c.read(&ra)?.as_bool()? || c.read(&rb)?.as_bool()?;
        Ok(params([if any { 0.9 } else { 0.1 }]))
    })?;
    ctx.condition(&report, true)?;
    Ok(a)
}

/// P(a | report) = 0.45 / 0.7.
#[test]
fn two_coin_posterior_matches_the_analytic_answer() {
    let mut rng = StdRng::seed_from_u64(11);
    let values = sample(&noisy_or, &mut rng, &quiet())
        .unwrap()
        .take(60_000)
        .map(|v| is_true(&v.unwrap()));

    let p = frequency(values);
    assert!((p - 0.45 / 0.7).abs() < 0.02, "p = {p}");
}

/// A fair coin whose proposal always flips the current value.
fn toggle() -> Distribution {
    Distribution::builder("toggle")
        .sample(|_, rng| Ok(Value::Bool(rng.next_u32() % 2 == 0)))
        .log_density(|value, _| {
            value.as_bool()?;
            Ok(0.5f64.ln())
        })
        .propose(|old, _, _| {
            Ok(Proposal {
                value: Value::Bool(!old.as_bool()?),
                forward: 0.0,
                backward: 0.0,
            })
        })
        .build()
        .unwrap()
}

fn toggled_or(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let a = ctx.random_with("a", &toggle(), params(Vec::<Value>::new()))?;
    let b = ctx.random_with("b", &toggle(), params(Vec::<Value>::new()))?;
    let (ra, rb) = (a.clone(), b.clone());
    let report = ctx.random("report", &flip(), move |c| {
        let any = c.read(&ra)?.as_bool()? || c.read(&rb)?.as_bool()?;
        Ok(params([if any { 0.9 } else { 0.1 }]))
    })?;
    ctx.condition(&report, true)?;
    Ok(a)
}

/// Without structural change and with a symmetric proposer, the acceptance
/// ratio is exactly the change in log-likelihood.
#[test]
fn symmetric_moves_accept_on_likelihood_alone() {
    let mut rng = StdRng::seed_from_u64(5);
    let trace = initialize(&toggled_or, &mut rng, None).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let acceptor = move |terms: &AcceptanceTerms, rng: &mut dyn RngCore| {
        log.borrow_mut().push(*terms);
        StandardAcceptor.accept(terms, rng)
    };

    let values: Vec<bool> = Sampler::new(trace, acceptor, rng, quiet())
        .take(60_000)
        .map(|s| is_true(&s.unwrap().value))
        .collect();

    for terms in seen.borrow().iter() {
        assert!((terms.total_backward - terms.total_forward).abs() < 1e-12);
        assert!((terms.log_ratio() - (terms.after - terms.before)).abs() < 1e-12);
    }
    let p = frequency(values);
    assert!((p - 0.45 / 0.7).abs() < 0.02, "p = {p}");
}

/// Both selection methods target the same posterior.
#[test]
fn alias_selection_samples_the_same_posterior() {
    let config = SamplerConfig {
        selection_method: SelectionMethod::Alias,
        batch_size: 7,
        ..quiet()
    };
    let mut rng = StdRng::seed_from_u64(12);
    let values = sample(&noisy_or, &mut rng, &config)
        .unwrap()
        .take(60_000)
        .map(|v| is_true(&v.unwrap()));

    let p = frequency(values);
    assert!((p - 0.45 / 0.7).abs() < 0.02, "p = {p}");
}

// =============================================================================
// Structure-changing moves
// =============================================================================

/// `x` only exists while `k` is true.
fn switched(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let k = ctx.random_with("k", &flip(), params([0.5]))?;
    ctx.deterministic("d", move |c| {
        if c.read(&k)?.as_bool()? {
            c.sample("x", &gaussian(), |_| Ok(params([0.0, 1.0])))
        } else {
            Ok(Value::Real(0.0))
        }
    })
}

/// Creating and destroying `x` keeps the marginal of `k` at its prior.
#[test]
fn reversible_jump_keeps_the_prior_marginal() {
    let sink = RecordingSink::new();
    let mut rng = StdRng::seed_from_u64(99);
    let trace = initialize(&switched, &mut rng, None).unwrap();
    let config = SamplerConfig {
        report_interval: 10_000,
        ..checked()
    };
    let sampler =
        Sampler::new(trace, StandardAcceptor, rng, config).with_sink(sink.clone());

    let x = at("d").child("x");
    let samples: Vec<Sample> = sampler.take(40_000).collect::<Result<_>>().unwrap();
    let p = frequency(samples.iter().map(|s| is_true(s.choices.value(&at("k")).unwrap())));
    assert!((p - 0.5).abs() < 0.03, "p = {p}");

    for s in &samples {
        let k = is_true(s.choices.value(&at("k")).unwrap());
        assert_eq!(s.choices.contains(&x), k);
    }
    let records = sink.records();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.topology_change_rate > 0.0));
}

/// Two coins; the program refuses executions where both are tails.
fn at_least_one_head(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let a = ctx.random_with("a", &flip(), params([0.5]))?;
    let b = ctx.random_with("b", &flip(), params([0.5]))?;
    let (ra, rb) = (a.clone(), b.clone());
    ctx.deterministic("guard", move |c| {
        if !c.read(&ra)?.as_bool()? && !c.read(&rb)?.as_bool()? {
            return Err(c.trace_failure());
        }
        Ok(Value::Unit)
    })?;
    Ok(a)
}

/// Hard constraints reject both initial executions and proposals.
#[test]
fn trace_failure_acts_as_a_hard_constraint() {
    let mut rng = StdRng::seed_from_u64(3);
    let values = sample(&at_least_one_head, &mut rng, &checked())
        .unwrap()
        .take(60_000)
        .map(|v| is_true(&v.unwrap()));

    let p = frequency(values);
    assert!((p - 2.0 / 3.0).abs() < 0.02, "p = {p}");
}

// =============================================================================
// Conditioning and memoization
// =============================================================================

fn conflicting(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let obs = ctx.random_with("obs", &flip(), params([0.5]))?;
    ctx.condition(&obs, true)?;
    ctx.condition(&obs, true)?;
    ctx.condition(&obs, false)?;
    Ok(obs)
}

/// A conflicting observation is fatal, not a rejection.
#[test]
fn conditioning_conflicts_surface_to_the_caller() {
    let mut rng = StdRng::seed_from_u64(1);
    let err = initialize(&conflicting, &mut rng, Some(3)).unwrap_err();
    match err {
        EngineError::ConditioningConflict {
            address,
            existing,
            observed,
        } => {
            assert_eq!(address, at("obs"));
            assert_eq!(existing, Value::Bool(true));
            assert_eq!(observed, Value::Bool(false));
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn coin_for(ctx: &mut Context<'_>, key: i64) -> Result<NodeRef> {
    ctx.memo("coin", &[Value::Int(key)], |c| {
        c.sample("flip", &flip(), |_| Ok(params([0.5])))
    })
}

fn memo_pair(ctx: &mut Context<'_>) -> Result<NodeRef> {
    ctx.deterministic("coins", |c| {
        let first = coin_for(c, 1)?;
        let again = coin_for(c, 1)?;
        let other = coin_for(c, 2)?;
        Ok(Value::List(vec![c.read(&first)?, c.read(&again)?, c.read(&other)?]))
    })
}

/// Equal memo arguments share one draw; different arguments are independent.
#[test]
fn memoized_draws_are_shared_by_argument() {
    let mut rng = StdRng::seed_from_u64(8);
    let values: Vec<Value> = sample(&memo_pair, &mut rng, &checked())
        .unwrap()
        .take(20_000)
        .collect::<Result<_>>()
        .unwrap();

    let mut differ = 0usize;
    for value in &values {
        let items = value.as_list().unwrap();
        assert_eq!(items[0], items[1]);
        if items[0] != items[2] {
            differ += 1;
        }
    }
    let p = differ as f64 / values.len() as f64;
    assert!((p - 0.5).abs() < 0.03, "p = {p}");
}

// =============================================================================
// Stick-breaking mixture
// =============================================================================

const TRUNCATION: i64 = 20;
const DATA: [f64; 3] = [-2.0, -2.1, 2.0];

fn stick(ctx: &mut Context<'_>, k: i64) -> Result<NodeRef> {
    ctx.memo("stick", &[Value::Int(k)], |c| {
        c.sample("weight", &beta(), |_| Ok(params([1.0, 1.0])))
    })
}

fn cluster_mean(ctx: &mut Context<'_>, k: i64) -> Result<NodeRef> {
    ctx.memo("mean", &[Value::Int(k)], |c| {
        c.sample("mu", &gaussian(), |_| Ok(params([0.0, 3.0])))
    })
}

/// Walk the sticks until one is taken.
fn assign(ctx: &mut Context<'_>) -> Result<Value> {
    for k in 0..TRUNCATION {
        let s = stick(ctx, k)?;
        let take = ctx.sample(k as u64, &flip(), move |c| Ok(params([c.read(&s)?])))?;
        if take.as_bool()? {
            return Ok(Value::Int(k));
        }
    }
    Ok(Value::Int(TRUNCATION))
}

fn stick_breaking(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let mut assignments = Vec::new();
    for (i, y) in DATA.iter().enumerate() {
        let z = ctx.deterministic(format!("z{i}"), assign)?;
        let rz = z.clone();
        let obs = ctx.random(format!("y{i}"), &gaussian(), move |c| {
            let k = c.read(&rz)?.as_int()?;
            let mean = cluster_mean(c, k)?;
            Ok(params([c.read(&mean)?, Value::Real(1.0)]))
        })?;
        ctx.condition(&obs, *y)?;
        assignments.push(z);
    }
    ctx.deterministic("clusters", move |c| {
        let ks = assignments
            .iter()
            .map(|z| c.read(z))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::List(ks))
    })
}

/// Nearby points share a cluster more often than distant ones, and the
/// graph stays consistent while sticks and means come and go.
#[test]
fn stick_breaking_groups_nearby_points() {
    let mut rng = StdRng::seed_from_u64(21);
    let values: Vec<Value> = sample(&stick_breaking, &mut rng, &checked())
        .unwrap()
        .take(20_000)
        .collect::<Result<_>>()
        .unwrap();

    let same = |i: usize, j: usize| {
        frequency(values.iter().map(|v| {
            let ks = v.as_list().unwrap();
            ks[i] == ks[j]
        }))
    };
    let near = same(0, 1);
    let far = same(0, 2);
    assert!(near > far, "near = {near}, far = {far}");
}

// =============================================================================
// Annealing
// =============================================================================

/// Equal mixture of N(-3, 1) and N(3, 1).
fn bimodal_log_density(x: f64) -> f64 {
    let component = |mean: f64| -0.5 * (x - mean).powi(2) - 0.5 * (2.0 * std::f64::consts::PI).ln();
    let (a, b) = (component(-3.0), component(3.0));
    let top = a.max(b);
    top + (0.5 * (a - top).exp() + 0.5 * (b - top).exp()).ln()
}

fn bimodal() -> Distribution {
    Distribution::builder("bimodal")
        .sample(|_, rng| gaussian().sample(&params([0.0, 5.0]), rng))
        .log_density(|value, _| Ok(bimodal_log_density(value.as_real()?)))
        .propose(|old, _, rng| {
            let value = gaussian().sample(&params([old.as_real()?, 1.0]), rng)?;
            Ok(Proposal {
                value,
                forward: 0.0,
                backward: 0.0,
            })
        })
        .build()
        .unwrap()
}

fn mixture_objective(ctx: &mut Context<'_>) -> Result<NodeRef> {
    ctx.random_with("x", &bimodal(), params(Vec::<Value>::new()))
}

fn mean_log_likelihood(samples: &[Sample]) -> f64 {
    samples.iter().map(|s| s.choices.log_likelihood()).sum::<f64>() / samples.len() as f64
}

/// Cooling concentrates the chain on the modes.
#[test]
fn annealing_climbs_toward_the_modes() {
    let schedule = AnnealingSchedule::new([(0.01, 500), (1.0, 500), (100.0, 500)]).unwrap();
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let samples = anneal_samples(&mixture_objective, &schedule, &mut rng, &quiet()).unwrap();
        assert_eq!(samples.len(), 1500);

        let first = mean_log_likelihood(&samples[..500]);
        let last = mean_log_likelihood(&samples[1000..]);
        assert!(last > first, "seed {seed}: first = {first}, last = {last}");
    }
}

fn shifted_mean(ctx: &mut Context<'_>) -> Result<NodeRef> {
    let mu = ctx.random_with("mu", &gaussian(), params([0.0, 1.0]))?;
    let m = mu.clone();
    let y = ctx.random("y", &gaussian(), move |c| {
        Ok(params([c.read(&m)?, Value::Real(1.0)]))
    })?;
    ctx.condition(&y, 0.5)?;
    Ok(mu)
}

/// Averaged importance weights estimate the evidence N(0.5; 0, sqrt 2).
#[test]
fn annealed_importance_estimates_the_evidence() {
    let schedule = AnnealingSchedule::new((1..=10).map(|k| (k as f64 / 10.0, 20))).unwrap();
    let mut rng = StdRng::seed_from_u64(4);
    let weights: Vec<f64> = (0..300)
        .map(|_| {
            annealed_importance(&shifted_mean, &schedule, &mut rng, &quiet())
                .unwrap()
                .log_weight
        })
        .collect();

    let top = weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_mean = top
        + (weights.iter().map(|w| (w - top).exp()).sum::<f64>() / weights.len() as f64).ln();
    let evidence = -0.5 * (2.0 * std::f64::consts::PI * 2.0).ln() - 0.25 / 4.0;
    assert!((log_mean - evidence).abs() < 0.1, "{log_mean} vs {evidence}");
}
