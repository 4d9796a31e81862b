use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use intensify::stage::Stage;
use intensify::stopping::{EventLog, ObserverError, StopEvent, StopScope};
use intensify::storage::TrialStore;
use intensify::{Budget, TrialKey, TrialRecord};

use crate::{REGRET, config, engine, settings};

fn one_config_stage(error: f64) -> (TrialStore, Stage) {
    let store = TrialStore::new();
    let id = store.register(config(0.25, 2));
    let record = TrialRecord::success(0.2).with_statistic("statistical_error", error);
    store.add(TrialKey::new(id).seed(0).budget(3.0), record).unwrap();
    let stage = Stage::new(4, 3.0, vec![id], 1).unwrap();
    (store, stage)
}

#[test]
fn test_event_log_records_stage_decisions() {
    let (store, stage) = one_config_stage(0.05);
    let log = EventLog::new();
    let mut engine = engine(settings().build()).with_observer(log.clone());
    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());

    let events = log.events();
    assert_eq!(events.len(), 1);
    let event = events[0];
    assert_eq!(
        event.scope,
        StopScope::Stage {
            id: 4,
            budget: Budget::new(3.0)
        }
    );
    assert!((event.min_lcb - 0.97).abs() < 1e-9);
    assert!((event.min_ucb - 1.0).abs() < 1e-9);
    assert!((event.regret - REGRET).abs() < 1e-9);
    assert!((event.statistical_error - 0.05).abs() < 1e-12);
    assert!((event.beta - 1.0).abs() < f64::EPSILON);
    assert!(event.triggered);
}

#[test]
fn test_closure_observers_see_every_decision() {
    let (store, stage) = one_config_stage(0.01);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let mut engine = engine(settings().build()).with_observer(
        move |event: &StopEvent| -> Result<(), ObserverError> {
            assert!(!event.triggered);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    for _ in 0..3 {
        assert!(!engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    }
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failing_observers_do_not_change_the_decision() {
    let (store, stage) = one_config_stage(0.05);
    let log = EventLog::new();
    let mut engine = engine(settings().build())
        .with_observer(|_: &StopEvent| -> Result<(), ObserverError> { Err("disk full".into()) })
        .with_observer(|_: &StopEvent| -> Result<(), ObserverError> {
            panic!("observer bug")
        })
        .with_observer(log.clone());

    assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
    // Observers after the failing ones still run
    assert!(log.last().unwrap().triggered);
}

#[test]
fn test_run_events_name_the_incumbent() {
    let store = TrialStore::new();
    let id = store.register(config(0.5, 1));
    store
        .add(
            TrialKey::new(id).seed(0),
            TrialRecord::success(0.3).with_statistic("std_crossval", 0.5),
        )
        .unwrap();
    let log = EventLog::new();
    let mut engine = engine(settings().fallback_threshold(0.2).build()).with_observer(log.clone());
    assert!(engine.should_run_stop(&store.snapshot()).unwrap());

    let event = log.last().unwrap();
    assert_eq!(event.scope, StopScope::Run { incumbent: id });
    assert!((event.statistical_error - 0.2).abs() < 1e-12);
}
