use intensify::acquisition::LowerBoundPolicy;
use intensify::stage::Stage;
use intensify::storage::{ConfigId, TrialStore};
use intensify::{Error, TrialKey, TrialRecord};

use crate::{REGRET, config, engine, settings};

/// Three configurations at budget 10, each annotated with `error`.
fn evaluated_stage(error: f64) -> (TrialStore, Stage) {
    let store = TrialStore::new();
    let mut ids = Vec::new();
    for (i, cost) in [0.4, 0.2, 0.6].into_iter().enumerate() {
        let id = store.register(config(i as f64 / 4.0, 2));
        let record = TrialRecord::success(cost).with_statistic("statistical_error", error);
        store.add(TrialKey::new(id).seed(0).budget(10.0), record).unwrap();
        ids.push(id);
    }
    let stage = Stage::new(0, 10.0, ids, 1).unwrap();
    (store, stage)
}

#[test]
fn test_noise_above_regret_stops() {
    let (store, stage) = evaluated_stage(0.05);
    let mut engine = engine(settings().build());
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    assert_eq!(engine.n_fits(), 1);
}

#[test]
fn test_noise_below_regret_continues() {
    let (store, stage) = evaluated_stage(0.01);
    let mut engine = engine(settings().build());
    assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_noise_equal_to_regret_stops() {
    let (store, stage) = evaluated_stage(REGRET);
    let mut engine = engine(settings().build());
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_near_tie_within_epsilon_stops() {
    let (store, stage) = evaluated_stage(REGRET - 0.005);
    let mut strict = engine(settings().build());
    assert!(!strict.should_stage_stop(&store.snapshot(), &stage).unwrap());

    let mut tolerant = engine(settings().stage_epsilon(0.01).build());
    assert!(tolerant.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_unevaluated_stage_never_stops() {
    let store = TrialStore::new();
    let id = store.register(config(0.5, 1));
    let stage = Stage::new(0, 10.0, vec![id], 1).unwrap();
    let mut engine = engine(settings().build());
    assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    assert_eq!(engine.n_fits(), 0);
}

#[test]
fn test_trials_at_other_budgets_are_ignored() {
    let (store, _) = evaluated_stage(0.05);
    let ids: Vec<ConfigId> = store.snapshot().configs().map(|(id, _)| id).collect();
    let stage = Stage::new(1, 30.0, ids, 1).unwrap();
    let mut engine = engine(settings().build());
    assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_missing_statistic_without_fallback_is_an_error() {
    let store = TrialStore::new();
    let id = store.register(config(0.5, 1));
    store
        .add(TrialKey::new(id).seed(0).budget(10.0), TrialRecord::success(0.3))
        .unwrap();
    let stage = Stage::new(0, 10.0, vec![id], 1).unwrap();

    let mut strict = engine(settings().build());
    let err = strict.should_stage_stop(&store.snapshot(), &stage).unwrap_err();
    assert!(matches!(err, Error::MissingStatistic { config: c, .. } if c == id));

    let mut lenient = engine(settings().fallback_threshold(0.05).build());
    assert!(lenient.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_fixed_zero_lower_bound_widens_the_regret() {
    // With a zero lower bound the regret is min_ucb itself: 1.0
    let (store, stage) = evaluated_stage(0.05);
    let mut engine = engine(settings().lower_bound(LowerBoundPolicy::FixedZero).build());
    assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());

    let (store, stage) = evaluated_stage(1.5);
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
}

#[test]
fn test_adaptive_beta_can_only_widen_the_bounds() {
    // beta 1 grows with 3 rows in 2 columns, so a noise level just above
    // the fixed-beta regret no longer suffices
    let (store, stage) = evaluated_stage(0.035);
    let mut fixed = engine(settings().build());
    assert!(fixed.should_stage_stop(&store.snapshot(), &stage).unwrap());

    let mut adaptive = engine(settings().update_beta(true).build());
    assert!(!adaptive.should_stage_stop(&store.snapshot(), &stage).unwrap());
}
