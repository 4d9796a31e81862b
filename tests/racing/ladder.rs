use core::ops::ControlFlow;

use intensify::dispatch::Dispatcher;
use intensify::intensifier::{Intensifier, StopReason};
use intensify::stage::{StageManager, StageState};
use intensify::storage::TrialStore;
use intensify::{Budget, Configuration, TrialKey, TrialRecord};

use crate::{design, fixed_engine, settings, sphere, x_of};

fn racer() -> Intensifier<crate::FixedModel> {
    let stages = StageManager::builder()
        .min_budget(1.0)
        .max_budget(27.0)
        .eta(3.0)
        .build();
    Intensifier::new(TrialStore::new(), stages, fixed_engine(settings().build()))
}

#[test]
fn test_successive_halving_shrinks_by_eta() {
    let mut racer = racer();
    let report = racer.race(design(27), &sphere).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(
        report.budgets,
        [1.0, 3.0, 9.0, 27.0].map(Budget::new).to_vec()
    );
    assert_eq!(report.evaluations, 27 + 9 + 3 + 1);

    let finished = racer.stages().finished();
    assert_eq!(finished.len(), 3);
    assert!(finished.iter().all(|s| s.state() == StageState::Promoted));
    let sizes: Vec<usize> = finished.iter().map(|s| s.configs().len()).collect();
    assert_eq!(sizes, vec![27, 9, 3]);
    assert_eq!(racer.stages().current().unwrap().state(), StageState::Exhausted);
}

#[test]
fn test_survivors_are_the_cheapest() {
    let mut racer = racer();
    racer.race(design(27), &sphere).unwrap();

    let history = racer.store().snapshot();
    let second = &racer.stages().finished()[1];
    let mut xs: Vec<f64> = second
        .configs()
        .iter()
        .map(|&id| x_of(history.config(id).unwrap()))
        .collect();
    xs.sort_by(f64::total_cmp);
    // the 9 points nearest 0.5 on a grid of step 4/26
    assert!(xs.iter().all(|x| (x - 0.5).abs() < 0.8));
}

#[test]
fn test_incumbent_is_best_at_top_budget() {
    let mut racer = racer();
    let report = racer.race(design(27), &sphere).unwrap();
    let incumbent = report.incumbent.unwrap();
    let best = racer.store().config(incumbent.config_id).unwrap();
    assert!((x_of(&best) - 0.5).abs() < 0.1);
    let expected = (x_of(&best) - 0.5).powi(2) + 1.0 / 27.0;
    assert!((incumbent.cost - expected).abs() < 1e-12);
}

#[test]
fn test_duplicate_initial_configs_are_raced_once() {
    let mut racer = racer();
    let mut configs = design(9);
    configs.extend(design(9));
    let report = racer.race(configs, &sphere).unwrap();
    assert_eq!(racer.store().snapshot().n_configs(), 9);
    assert_eq!(report.evaluations, 9 + 3 + 1 + 1);
}

struct Budgeted {
    max_evaluations: usize,
    seen: std::cell::Cell<usize>,
}

impl Dispatcher for Budgeted {
    type Error = String;

    fn evaluate(&self, config: &Configuration, key: &TrialKey) -> Result<TrialRecord, String> {
        sphere(config, key)
    }

    fn after_trial(&self, _key: &TrialKey, _record: &TrialRecord) -> ControlFlow<()> {
        self.seen.set(self.seen.get() + 1);
        if self.seen.get() >= self.max_evaluations {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

#[test]
fn test_halting_dispatcher_ends_the_race() {
    let mut racer = racer();
    let dispatcher = Budgeted {
        max_evaluations: 30,
        seen: std::cell::Cell::new(0),
    };
    let report = racer.race(design(27), &dispatcher).unwrap();
    assert_eq!(report.stop_reason, StopReason::Halted);
    assert_eq!(report.evaluations, 30);
    assert_eq!(report.stages_visited, 2);
    assert_eq!(racer.stages().current().unwrap().state(), StageState::Running);
}

#[test]
fn test_failed_trials_are_kept_in_the_ledger() {
    let mut racer = racer();
    let flaky = |config: &Configuration, key: &TrialKey| {
        if x_of(config) > 1.5 {
            Err("diverged".to_owned())
        } else {
            sphere(config, key)
        }
    };
    let report = racer.race(design(9), &flaky).unwrap();
    // x = 2.0 fails at the first rung and is never promoted
    assert_eq!(report.failures, 1);
    let history = racer.store().snapshot();
    let failed: Vec<_> = history
        .trials()
        .filter(|(_, r)| r.cost.is_none())
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].1.statistics.get("error"),
        Some(&intensify::AttrValue::String("diverged".into()))
    );
}
