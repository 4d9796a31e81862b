use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use intensify::encoder::Encoder;
use intensify::space::SearchSpace;
use intensify::stage::Stage;
use intensify::stopping::{StoppingConfig, StoppingEngine};
use intensify::storage::{TrialHistory, TrialStore};
use intensify::surrogate::GaussianProcess;
use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};

fn space(dims: usize) -> Arc<SearchSpace> {
    let builder = (0..dims).fold(SearchSpace::builder(), |b, i| {
        b.float(format!("x{i}"), -5.0, 5.0)
    });
    Arc::new(builder.build().unwrap())
}

/// A stage of `n` random configurations evaluated on the sphere function.
fn populated(dims: usize, n: usize, seed: u64) -> (Arc<TrialHistory>, Stage) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let store = TrialStore::new();
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let x: Vec<f64> = (0..dims).map(|_| rng.f64() * 10.0 - 5.0).collect();
        let config = x
            .iter()
            .enumerate()
            .fold(Configuration::new(), |c, (i, &v)| {
                c.with(format!("x{i}"), ParamValue::Float(v))
            });
        let id = store.register(config);
        let cost: f64 = x.iter().map(|v| v * v).sum();
        let record = TrialRecord::success(cost).with_statistic("statistical_error", 0.5);
        store.add(TrialKey::new(id).seed(0).budget(1.0), record).unwrap();
        ids.push(id);
    }
    let survivors = (n / 3).max(1);
    (store.snapshot(), Stage::new(0, 1.0, ids, survivors).unwrap())
}

fn bench_encoder_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoder_transform");

    for n in [50, 500] {
        let (history, _) = populated(10, n, 42);
        let encoder = Encoder::new(space(10));
        group.bench_with_input(BenchmarkId::new("trials", n), &history, |b, history| {
            b.iter(|| encoder.transform(history, None).unwrap());
        });
    }
    group.finish();
}

fn bench_stage_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_stage_stop");
    group.sample_size(10);

    for n in [20, 100] {
        let (history, stage) = populated(5, n, 42);
        let config = StoppingConfig::builder().n_points_lcb(200).seed(42).build();
        let mut engine = StoppingEngine::new(GaussianProcess::new(), Encoder::new(space(5)), config);
        group.bench_with_input(BenchmarkId::new("configs", n), &history, |b, history| {
            b.iter(|| engine.should_stage_stop(history, &stage).unwrap());
        });
    }
    group.finish();
}

fn bench_run_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_run_stop");
    group.sample_size(10);

    let (history, _) = populated(5, 50, 7);
    let config = StoppingConfig::builder()
        .n_points_lcb(200)
        .fallback_threshold(0.1)
        .seed(7)
        .build();
    let mut engine = StoppingEngine::new(GaussianProcess::new(), Encoder::new(space(5)), config);
    group.bench_function("configs/50", |b| {
        b.iter(|| engine.should_run_stop(&history).unwrap());
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encoder_transform,
    bench_stage_decision,
    bench_run_decision
);
criterion_main!(benches);
