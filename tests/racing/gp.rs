use intensify::encoder::Encoder;
use intensify::intensifier::{Intensifier, StopReason};
use intensify::stage::StageManager;
use intensify::stopping::StoppingEngine;
use intensify::storage::TrialStore;
use intensify::surrogate::{GaussianProcess, SurrogateModel};
use intensify::{Configuration, TrialKey, TrialRecord};

use crate::{design, settings, space, sphere};

fn ladder() -> StageManager {
    StageManager::builder()
        .min_budget(1.0)
        .max_budget(9.0)
        .eta(3.0)
        .build()
}

/// Each estimate is so noisy that no surrogate can tell configurations apart.
fn noisy(config: &Configuration, key: &TrialKey) -> Result<TrialRecord, String> {
    Ok(sphere(config, key)?.with_statistic("statistical_error", 100.0))
}

#[test]
fn test_noisy_estimates_stop_the_first_stage() {
    let engine = StoppingEngine::new(
        GaussianProcess::new(),
        Encoder::new(space()),
        settings().update_beta(true).n_points_lcb(50).build(),
    );
    let mut racer = Intensifier::new(TrialStore::new(), ladder(), engine);
    let report = racer.race(design(9), &noisy).unwrap();

    assert!(matches!(
        report.stop_reason,
        StopReason::StageStopped { stage_id: 0, .. }
    ));
    assert_eq!(report.evaluations, 9);
    assert_eq!(racer.engine().n_fits(), 1);
    assert!(racer.engine().model().is_fitted());
    assert!(report.incumbent.is_some());
}

#[test]
fn test_too_few_rows_never_fit_the_model() {
    let engine = StoppingEngine::new(
        GaussianProcess::new(),
        Encoder::new(space()),
        settings().min_trials(5).build(),
    );
    let mut racer = Intensifier::new(TrialStore::new(), ladder(), engine);
    let report = racer.race(design(4), &noisy).unwrap();

    // 4 rows, then 1, then 1: the stage check never has enough data
    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.evaluations, 4 + 1 + 1);
    assert_eq!(racer.engine().n_fits(), 0);
}
