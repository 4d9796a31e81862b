use core::cell::Cell;
use core::ops::ControlFlow;

use intensify::dispatch::Dispatcher;
use intensify::intensifier::{Intensifier, StopReason};
use intensify::stage::StageManager;
use intensify::storage::{JournalStorage, TrialStore};
use intensify::{Configuration, TrialKey, TrialRecord};

use crate::{design, fixed_engine, settings, sphere};

fn temp_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("intensify_resume_test_{}.jsonl", std::process::id()));
    path
}

fn ladder() -> StageManager {
    StageManager::builder()
        .budgets([1.0, 3.0, 9.0])
        .build()
}

/// Crashes the worker after a fixed number of evaluations.
struct Crashing {
    after: usize,
    count: Cell<usize>,
}

impl Dispatcher for Crashing {
    type Error = String;

    fn evaluate(&self, config: &Configuration, key: &TrialKey) -> Result<TrialRecord, String> {
        self.count.set(self.count.get() + 1);
        sphere(config, key)
    }

    fn after_trial(&self, _key: &TrialKey, _record: &TrialRecord) -> ControlFlow<()> {
        if self.count.get() >= self.after {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

#[test]
fn test_resumed_race_skips_journaled_trials() {
    let path = temp_path();
    std::fs::remove_file(&path).ok();

    let store = TrialStore::with_storage(JournalStorage::new(&path));
    let mut first = Intensifier::new(store, ladder(), fixed_engine(settings().build()));
    let crashing = Crashing {
        after: 5,
        count: Cell::new(0),
    };
    let report = first.race(design(9), &crashing).unwrap();
    assert_eq!(report.stop_reason, StopReason::Halted);
    assert_eq!(report.evaluations, 5);

    let store = TrialStore::with_storage(JournalStorage::open(&path).unwrap());
    assert_eq!(store.snapshot().len(), 5);
    let mut second = Intensifier::new(store, ladder(), fixed_engine(settings().build()));
    let report = second.race(design(9), &sphere).unwrap();

    assert_eq!(report.stop_reason, StopReason::Exhausted);
    assert_eq!(report.evaluations, 4 + 3 + 1);
    assert_eq!(second.store().snapshot().n_configs(), 9);
    assert_eq!(second.store().snapshot().len(), 9 + 3 + 1);

    std::fs::remove_file(&path).ok();
}
