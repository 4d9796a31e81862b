use intensify::storage::{ConfigId, TrialStore};
use intensify::stopping::correction_factor;
use intensify::{Error, TrialKey, TrialRecord};

use crate::{config, engine, settings};

/// A cross-validated record: 5 folds of 100 points, so `factor = 0.45`.
fn crossval(cost: f64, std: f64) -> TrialRecord {
    TrialRecord::success(cost)
        .with_statistic("std_crossval", std)
        .with_statistic("folds", 5_i64)
        .with_statistic("data_points", 100_i64)
}

fn store_with(records: Vec<TrialRecord>) -> (TrialStore, Vec<ConfigId>) {
    let store = TrialStore::new();
    let mut ids = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        let id = store.register(config(i as f64 / 10.0, 1));
        store.add(TrialKey::new(id).seed(0), record).unwrap();
        ids.push(id);
    }
    (store, ids)
}

#[test]
fn test_correction_factor() {
    assert!((correction_factor(5.0, 100.0).unwrap() - 0.45).abs() < 1e-12);
    assert!((correction_factor(10.0, 1000.0).unwrap() - (0.1 + 100.0 / 900.0)).abs() < 1e-12);
    assert_eq!(correction_factor(0.5, 100.0), None);
}

#[test]
fn test_no_incumbent_never_stops() {
    let store = TrialStore::new();
    let mut engine = engine(settings().build());
    assert!(!engine.should_run_stop(&store.snapshot()).unwrap());
    assert_eq!(engine.n_fits(), 0);
}

#[test]
fn test_large_incumbent_error_stops_the_run() {
    // 0.45 * 0.5^2 = 0.1125 >= 0.03
    let (store, _) = store_with(vec![crossval(0.3, 0.5), crossval(0.5, 0.5)]);
    let mut engine = engine(settings().build());
    assert!(engine.should_run_stop(&store.snapshot()).unwrap());
}

#[test]
fn test_small_incumbent_error_continues() {
    // 0.45 * 0.1^2 = 0.0045 < 0.03
    let (store, _) = store_with(vec![crossval(0.3, 0.1), crossval(0.5, 0.5)]);
    let mut engine = engine(settings().build());
    assert!(!engine.should_run_stop(&store.snapshot()).unwrap());
}

#[test]
fn test_error_follows_the_improving_incumbent() {
    let (store, _) = store_with(vec![crossval(0.5, 0.5)]);
    let mut engine = engine(settings().build());
    assert!(engine.should_run_stop(&store.snapshot()).unwrap());

    // A better configuration with a precise estimate takes over
    let id = store.register(config(0.9, 3));
    store.add(TrialKey::new(id).seed(0), crossval(0.1, 0.1)).unwrap();
    assert_eq!(store.incumbent().unwrap().config_id, id);
    assert!(!engine.should_run_stop(&store.snapshot()).unwrap());
}

#[test]
fn test_missing_crossval_fields() {
    let (store, ids) = store_with(vec![TrialRecord::success(0.2).with_statistic("std_crossval", 0.4)]);

    let mut strict = engine(settings().build());
    let err = strict.should_run_stop(&store.snapshot()).unwrap_err();
    assert!(matches!(
        err,
        Error::MissingStatistic { config: c, ref name } if c == ids[0] && name == "folds"
    ));

    let mut lenient = engine(settings().fallback_threshold(0.2).build());
    assert!(lenient.should_run_stop(&store.snapshot()).unwrap());
}

#[test]
fn test_min_trials_delays_the_first_fit() {
    let (store, _) = store_with(vec![crossval(0.3, 0.5)]);
    let mut engine = engine(settings().min_trials(3).build());
    assert!(!engine.should_run_stop(&store.snapshot()).unwrap());
    assert_eq!(engine.n_fits(), 0);
}

#[test]
fn test_renamed_crossval_fields() {
    let record = TrialRecord::success(0.3)
        .with_statistic("cv_std", 0.5)
        .with_statistic("k", 5_i64)
        .with_statistic("n", 100_i64);
    let (store, _) = store_with(vec![record]);
    let mut engine = engine(settings().crossval_fields("cv_std", "k", "n").build());
    assert!(engine.should_run_stop(&store.snapshot()).unwrap());
}

#[test]
fn test_error_follows_new_samples_of_the_incumbent() {
    // Seed 0 is precise: 0.45 * 0.1^2 = 0.0045 < 0.03
    let (store, ids) = store_with(vec![crossval(0.3, 0.1), crossval(0.5, 0.1)]);
    let mut engine = engine(settings().build());
    assert!(!engine.should_run_stop(&store.snapshot()).unwrap());

    // A noisy repeat keeps the same incumbent but raises its mean error to
    // (0.0045 + 0.45 * 0.7^2) / 2 = 0.1125
    store
        .add(TrialKey::new(ids[0]).seed(1), crossval(0.3, 0.7))
        .unwrap();
    assert_eq!(store.incumbent().unwrap().config_id, ids[0]);
    assert!(engine.should_run_stop(&store.snapshot()).unwrap());
}
