//! Benchmarks for the MH step and proposal selection.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::hint::black_box;

use tangle_core::distribution::builtin::gaussian;
use tangle_core::engine::Context;
use tangle_core::graph::{params, NodeRef, Value};
use tangle_core::inference::{initialize, Sampler, Selection, StandardAcceptor};
use tangle_core::{Result, SamplerConfig, SelectionMethod};

/// Gaussian random walk of length `n`; each step reads the previous one.
fn walk(ctx: &mut Context<'_>, n: usize) -> Result<NodeRef> {
    let mut previous = ctx.random_with(0usize, &gaussian(), params([0.0, 1.0]))?;
    for i in 1..n {
        let p = previous.clone();
        previous = ctx.random(i, &gaussian(), move |c| {
            Ok(params([c.read(&p)?, Value::Real(1.0)]))
        })?;
    }
    Ok(previous)
}

fn config() -> SamplerConfig {
    SamplerConfig {
        report_interval: u64::MAX,
        ..SamplerConfig::default()
    }
}

/// One MH step on walks of increasing length
fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("walk", n), &n, |b, &n| {
            let program = move |ctx: &mut Context<'_>| walk(ctx, n);
            let mut rng = StdRng::seed_from_u64(0);
            let trace = initialize(&program, &mut rng, None).unwrap();
            let mut sampler = Sampler::new(trace, StandardAcceptor, rng, config());
            b.iter(|| black_box(sampler.next()));
        });
    }

    group.finish();
}

/// Building the selection and drawing a batch
fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for n in [100, 1000] {
        let program = move |ctx: &mut Context<'_>| walk(ctx, n);
        let mut rng = StdRng::seed_from_u64(1);
        let trace = initialize(&program, &mut rng, None).unwrap();

        group.bench_with_input(BenchmarkId::new("build", n), &trace, |b, trace| {
            b.iter(|| black_box(Selection::build(&trace.choices)));
        });

        let selection = Selection::build(&trace.choices);
        for method in [SelectionMethod::Cumulative, SelectionMethod::Alias] {
            let id = BenchmarkId::new(format!("draw_{method:?}").to_lowercase(), n);
            group.bench_with_input(id, &selection, |b, selection| {
                b.iter(|| black_box(selection.draw_batch(100, method, &mut rng).unwrap()));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_selection);
criterion_main!(benches);
