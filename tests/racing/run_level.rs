use intensify::intensifier::{Intensifier, StopReason};
use intensify::stage::{StageManager, StageState};
use intensify::stopping::{EventLog, StopScope};
use intensify::storage::TrialStore;
use intensify::{Configuration, TrialKey, TrialRecord};

use crate::{FixedModel, design, fixed_engine, settings, sphere};

fn ladder() -> StageManager {
    StageManager::builder()
        .budgets([1.0, 3.0, 9.0])
        .eta(3.0)
        .build()
}

/// Cross-validated sphere: 5 folds of 100 points, so the error is `0.45 * std^2`.
fn crossval(std: f64) -> impl Fn(&Configuration, &TrialKey) -> Result<TrialRecord, String> {
    move |config, key| {
        Ok(sphere(config, key)?
            .with_statistic("std_crossval", std)
            .with_statistic("folds", 5_i64)
            .with_statistic("data_points", 100_i64))
    }
}

fn racer(log: &EventLog) -> Intensifier<FixedModel> {
    let engine = fixed_engine(settings().build()).with_observer(log.clone());
    Intensifier::new(TrialStore::new(), ladder(), engine).run_stopping(true)
}

#[test]
fn test_noisy_incumbent_stops_the_run() {
    let log = EventLog::new();
    let mut racer = racer(&log);
    // 0.45 * 0.5^2 = 0.1125 >= 0.03
    let report = racer.race(design(9), &crossval(0.5)).unwrap();

    assert_eq!(report.stop_reason, StopReason::RunStopped);
    assert_eq!(report.stages_visited, 1);
    assert_eq!(report.evaluations, 9);
    assert_eq!(racer.stages().current().unwrap().state(), StageState::Stopped);

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0].scope, StopScope::Stage { id: 0, .. }));
    assert!(!events[0].triggered);
    assert!(matches!(events[1].scope, StopScope::Run { .. }));
    assert!(events[1].triggered);
}

#[test]
fn test_precise_incumbent_lets_the_race_finish() {
    let log = EventLog::new();
    let mut racer = racer(&log);
    // 0.45 * 0.1^2 = 0.0045 < 0.03
    let report = racer.race(design(9), &crossval(0.1)).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.stages_visited, 3);
    assert_eq!(report.evaluations, 9 + 3 + 1);
    // one stage and one run decision per rung
    assert_eq!(log.events().len(), 6);
    assert!(log.events().iter().all(|e| !e.triggered));
}

#[test]
fn test_missing_crossval_annotations_do_not_stop_the_run() {
    let log = EventLog::new();
    let mut racer = racer(&log);
    let report = racer.race(design(9), &sphere).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    // the run check fails before emitting, so only stage events are logged
    assert_eq!(log.events().len(), 3);
    assert!(
        log.events()
            .iter()
            .all(|e| matches!(e.scope, StopScope::Stage { .. }))
    );
}

#[test]
fn test_fallback_threshold_stands_in_for_crossval() {
    let engine = fixed_engine(settings().fallback_threshold(0.2).build());
    let mut racer = Intensifier::new(TrialStore::new(), ladder(), engine).run_stopping(true);
    let report = racer.race(design(9), &sphere).unwrap();
    assert_eq!(report.stop_reason, StopReason::RunStopped);
    assert_eq!(report.budgets.len(), 1);
}
