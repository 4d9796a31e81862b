use intensify::Error;
use intensify::acquisition::Marginalization;
use intensify::encoder::Encoder;
use intensify::stage::Stage;
use intensify::stopping::{EventLog, StoppingConfig, StoppingEngine};
use intensify::storage::TrialStore;
use intensify::surrogate::{Prediction, SurrogateModel};
use intensify::{TrialKey, TrialRecord};

use crate::{FixedModel, config, settings, space};

/// Predicts from the trailing instance column only: instance 0 has mean
/// 0.9 and variance 0.0001, instance 1 mean 1.0 and variance 0.0009.
///
/// Averaged over both instances every candidate gets mean 0.95 and
/// variance 0.0005.
#[derive(Debug, Default)]
struct PerInstance {
    fitted: bool,
}

const WIDTH: usize = 3;

impl SurrogateModel for PerInstance {
    fn train(&mut self, x: &[Vec<f64>], _y: &[f64]) -> intensify::Result<()> {
        if let Some(row) = x.iter().find(|r| r.len() != WIDTH) {
            return Err(Error::DimensionMismatch {
                expected: WIDTH,
                got: row.len(),
            });
        }
        self.fitted = !x.is_empty();
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn predict(&self, x: &[Vec<f64>]) -> intensify::Result<Prediction> {
        let mut out = Prediction::default();
        for row in x {
            if row.len() != WIDTH {
                return Err(Error::DimensionMismatch {
                    expected: WIDTH,
                    got: row.len(),
                });
            }
            let instance = row[WIDTH - 1];
            out.mean.push(0.9 + 0.1 * instance);
            out.variance.push(0.0001 + 0.0008 * instance);
        }
        Ok(out)
    }
}

fn with_instances() -> Encoder {
    Encoder::builder(space()).instance_context(true).build()
}

/// Four configurations, each evaluated on instances `a` and `b` at budget 1.
fn instance_stage(error: f64) -> (TrialStore, Stage) {
    let store = TrialStore::new();
    let mut ids = Vec::new();
    for i in 0..4 {
        let id = store.register(config(f64::from(i) / 4.0, 1 + i64::from(i)));
        for instance in ["a", "b"] {
            let record = TrialRecord::success(0.5 + f64::from(i) / 10.0)
                .with_statistic("statistical_error", error);
            let key = TrialKey::new(id).instance(instance).seed(0).budget(1.0);
            store.add(key, record).unwrap();
        }
        ids.push(id);
    }
    (store, Stage::new(0, 1.0, ids, 1).unwrap())
}

fn engine_over_instances(config: StoppingConfig, log: &EventLog) -> StoppingEngine<PerInstance> {
    StoppingEngine::new(PerInstance::default(), with_instances(), config).with_observer(log.clone())
}

#[test]
fn test_bounds_average_over_instances() {
    let (store, stage) = instance_stage(0.05);
    let log = EventLog::new();
    let config = settings()
        .marginalization(Marginalization::OverInstances)
        .build();
    let mut engine = engine_over_instances(config, &log);

    // regret = 2 * sqrt(0.0005) ~= 0.0447 <= 0.05
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    let event = log.last().unwrap();
    let std = 0.0005_f64.sqrt();
    assert!((event.min_lcb - (0.95 - std)).abs() < 1e-9);
    assert!((event.min_ucb - (0.95 + std)).abs() < 1e-9);
    assert!((event.regret - 2.0 * std).abs() < 1e-9);
}

#[test]
fn test_averaged_regret_above_the_noise_continues() {
    let (store, stage) = instance_stage(0.04);
    let log = EventLog::new();
    let config = settings()
        .marginalization(Marginalization::OverInstances)
        .build();
    let mut engine = engine_over_instances(config, &log);
    assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    assert!(!log.last().unwrap().triggered);
}

#[test]
fn test_context_columns_imply_marginalization() {
    let (store, stage) = instance_stage(0.05);
    let log = EventLog::new();
    // Marginalization left at its default
    let mut engine = engine_over_instances(settings().build(), &log);
    assert_eq!(
        engine.config().marginalization(),
        Marginalization::OverInstances
    );
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    assert!((log.last().unwrap().regret - 2.0 * 0.0005_f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_plain_layout_ignores_requested_marginalization() {
    let (store, stage) = instance_stage(0.05);
    let config = settings()
        .marginalization(Marginalization::OverInstances)
        .build();
    let mut engine = StoppingEngine::new(FixedModel::default(), Encoder::new(space()), config);
    assert_eq!(engine.config().marginalization(), Marginalization::None);
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
}
