//! The racing loop that wires the ledger, the stage ladder and the
//! stopping engine together.
//!
//! [`Intensifier::race`] registers an initial design, evaluates every alive
//! configuration at the current stage budget through a
//! [`Dispatcher`], asks the [`StoppingEngine`] whether the stage may stop,
//! and otherwise promotes the survivors to the next budget until the ladder
//! is exhausted.
//!
//! ```
//! # #[cfg(feature = "gp")]
//! # fn main() -> intensify::Result<()> {
//! use std::sync::Arc;
//!
//! use intensify::encoder::Encoder;
//! use intensify::intensifier::Intensifier;
//! use intensify::space::SearchSpace;
//! use intensify::stage::StageManager;
//! use intensify::stopping::{StoppingConfig, StoppingEngine};
//! use intensify::storage::TrialStore;
//! use intensify::surrogate::GaussianProcess;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let space = Arc::new(SearchSpace::builder().float("x", -1.0, 1.0).build()?);
//! let config = StoppingConfig::builder()
//!     .statistic_name(None)
//!     .fallback_threshold(0.0)
//!     .seed(3)
//!     .build();
//! let engine = StoppingEngine::new(GaussianProcess::new(), Encoder::new(space), config);
//! let stages = StageManager::builder().min_budget(1.0).max_budget(9.0).eta(3.0).build();
//!
//! let mut racer = Intensifier::new(TrialStore::new(), stages, engine);
//! let design = (0..9).map(|i| {
//!     Configuration::new().with("x", ParamValue::Float(f64::from(i) / 4.0 - 1.0))
//! });
//! let report = racer.race(design, &|config: &Configuration, key: &TrialKey| {
//!     let Some(ParamValue::Float(x)) = config.get("x") else {
//!         return Err("x is missing");
//!     };
//!     let budget = key.budget.map_or(1.0, |b| b.value());
//!     Ok(TrialRecord::success(x * x + 0.1 / budget))
//! })?;
//!
//! // The first stage always runs in full
//! assert!(report.evaluations >= 9);
//! assert!(report.incumbent.is_some());
//! println!("stopped after {} stages: {:?}", report.stages_visited, report.stop_reason);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "gp"))]
//! # fn main() {}
//! ```

use core::ops::ControlFlow;

use crate::dispatch::{Dispatcher, evaluate_with_retries};
use crate::error::{Error, Result};
use crate::param::Configuration;
use crate::stage::{Stage, StageManager, StageState};
use crate::stopping::StoppingEngine;
use crate::storage::{ConfigId, Incumbent, TrialStore};
use crate::surrogate::SurrogateModel;
use crate::trial::TrialKey;
use crate::types::{Budget, TrialStatus};

/// Why a race ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopReason {
    /// The stopping engine stopped this stage.
    StageStopped {
        /// The stopped stage.
        stage_id: usize,
        /// Its budget.
        budget: Budget,
    },
    /// The run-level check fired.
    RunStopped,
    /// The highest budget was evaluated, or no configuration was left.
    Exhausted,
    /// The dispatcher asked to halt.
    Halted,
}

/// Summary of one race.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceReport {
    /// Best configuration at the highest budget that has results, with its
    /// aggregated cost there.
    pub incumbent: Option<Incumbent>,
    /// Number of stages that dispatched evaluations.
    pub stages_visited: usize,
    /// Budgets of the visited stages, in order.
    pub budgets: Vec<Budget>,
    /// Evaluations issued to the dispatcher (retries not counted).
    pub evaluations: usize,
    /// Evaluations recorded as failures.
    pub failures: usize,
    /// Why the race ended.
    pub stop_reason: StopReason,
}

#[derive(Default)]
struct Tally {
    evaluations: usize,
    failures: usize,
}

/// Races configurations along a budget ladder.
///
/// Every alive configuration is evaluated once per seed (and per instance,
/// if instances are set) at each stage budget. Keys already present in the
/// ledger are not evaluated again, so a race over a restored journal picks
/// up where it left off.
///
/// Decisions that fail for lack of data or annotations
/// ([`Error::MissingStatistic`], [`Error::EmptyDataset`],
/// [`Error::ModelFit`], [`Error::NotFitted`]) are logged and count as "do
/// not stop". Any other error ends the race.
pub struct Intensifier<M> {
    store: TrialStore,
    stages: StageManager,
    engine: StoppingEngine<M>,
    seeds: Vec<u64>,
    instances: Vec<String>,
    run_stopping: bool,
}

impl<M: SurrogateModel> Intensifier<M> {
    /// Creates an intensifier evaluating each configuration with seed `0`
    /// and no instance. The run-level check is off.
    #[must_use]
    pub fn new(store: TrialStore, stages: StageManager, engine: StoppingEngine<M>) -> Self {
        Self {
            store,
            stages,
            engine,
            seeds: vec![0],
            instances: Vec::new(),
            run_stopping: false,
        }
    }

    /// Sets the seeds every configuration is evaluated with at each stage.
    ///
    /// # Panics
    ///
    /// Panics if `seeds` is empty.
    #[must_use]
    pub fn seeds(mut self, seeds: impl IntoIterator<Item = u64>) -> Self {
        let seeds: Vec<u64> = seeds.into_iter().collect();
        assert!(!seeds.is_empty(), "at least one seed is required");
        self.seeds = seeds;
        self
    }

    /// Sets the problem instances every configuration is evaluated on.
    #[must_use]
    pub fn instances(mut self, instances: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.instances = instances.into_iter().map(Into::into).collect();
        self
    }

    /// Also consults [`StoppingEngine::should_run_stop`] after every stage.
    #[must_use]
    pub fn run_stopping(mut self, enabled: bool) -> Self {
        self.run_stopping = enabled;
        self
    }

    /// The ledger.
    #[must_use]
    pub fn store(&self) -> &TrialStore {
        &self.store
    }

    /// The stage ladder and its current race.
    #[must_use]
    pub fn stages(&self) -> &StageManager {
        &self.stages
    }

    /// The stopping engine.
    #[must_use]
    pub fn engine(&self) -> &StoppingEngine<M> {
        &self.engine
    }

    /// Mutable access to the stopping engine, e.g. to add observers.
    pub fn engine_mut(&mut self) -> &mut StoppingEngine<M> {
        &mut self.engine
    }

    /// Races `configs` until a stage is stopped, the ladder is exhausted or
    /// the dispatcher halts.
    ///
    /// Later duplicates in `configs` are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if a previous race was halted
    /// mid-stage and never finished, or any ledger, encoding or prediction
    /// error raised while racing.
    pub fn race<D: Dispatcher + ?Sized>(
        &mut self,
        configs: impl IntoIterator<Item = Configuration>,
        dispatcher: &D,
    ) -> Result<RaceReport> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("race", n_budgets = self.stages.budgets().len()).entered();

        let ids = self.store.register_all(configs);
        self.stages.start(ids)?;

        let mut tally = Tally::default();
        let mut budgets = Vec::new();
        let stop_reason = loop {
            let stage = self.current_stage()?;
            if stage.state() == StageState::Exhausted {
                break StopReason::Exhausted;
            }
            self.stages.mark_running()?;
            budgets.push(stage.budget());

            if self.dispatch_stage(&stage, dispatcher, &mut tally)?.is_break() {
                trace_info!(stage = stage.id(), "race halted by dispatcher");
                break StopReason::Halted;
            }

            let history = self.store.snapshot();
            let state = self.stages.refresh(&history)?;
            if state != StageState::Evaluated {
                return Err(Error::InvalidTransition {
                    from: state,
                    to: StageState::Evaluated,
                });
            }

            if recoverable(self.engine.should_stage_stop(&history, &stage))? {
                self.stages.stop()?;
                break StopReason::StageStopped {
                    stage_id: stage.id(),
                    budget: stage.budget(),
                };
            }
            if self.run_stopping && recoverable(self.engine.should_run_stop(&history))? {
                self.stages.stop()?;
                break StopReason::RunStopped;
            }

            match self.stages.promote(&history)? {
                Some(next) if next.state() != StageState::Exhausted => {}
                _ => break StopReason::Exhausted,
            }
        };

        let report = RaceReport {
            incumbent: self.best_at_highest_budget(),
            stages_visited: budgets.len(),
            budgets,
            evaluations: tally.evaluations,
            failures: tally.failures,
            stop_reason,
        };
        trace_info!(
            stages = report.stages_visited,
            evaluations = report.evaluations,
            reason = ?report.stop_reason,
            "race finished"
        );
        Ok(report)
    }

    fn current_stage(&self) -> Result<Stage> {
        self.stages
            .current()
            .cloned()
            .ok_or_else(|| Error::NotFound("no stage has been started".to_owned()))
    }

    fn keys_for(&self, id: ConfigId, budget: Budget) -> Vec<TrialKey> {
        let base = TrialKey::new(id).budget(budget);
        if self.instances.is_empty() {
            return self.seeds.iter().map(|&s| base.clone().seed(s)).collect();
        }
        self.instances
            .iter()
            .flat_map(|instance| {
                self.seeds
                    .iter()
                    .map(|&s| base.clone().instance(instance.clone()).seed(s))
            })
            .collect()
    }

    fn dispatch_stage<D: Dispatcher + ?Sized>(
        &self,
        stage: &Stage,
        dispatcher: &D,
        tally: &mut Tally,
    ) -> Result<ControlFlow<()>> {
        for &id in stage.configs() {
            let config = self.store.config(id)?;
            for key in self.keys_for(id, stage.budget()) {
                if self.store.snapshot().get(&key).is_ok() {
                    trace_debug!(key = %key, "trial already recorded");
                    continue;
                }
                let record = evaluate_with_retries(dispatcher, &config, &key);
                tally.evaluations += 1;
                if record.status == TrialStatus::Failure {
                    tally.failures += 1;
                }

                let flow = dispatcher.after_trial(&key, &record);
                match self.store.add(key, record) {
                    Ok(()) => {}
                    // Another writer recorded the same key first
                    Err(Error::DuplicateKey(_key)) => {
                        trace_debug!(key = %_key, "trial recorded concurrently");
                    }
                    Err(e) => return Err(e),
                }
                if flow.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn best_at_highest_budget(&self) -> Option<Incumbent> {
        let history = self.store.snapshot();
        self.stages
            .current()
            .into_iter()
            .chain(self.stages.finished().iter().rev())
            .find_map(|stage| {
                let best = *stage.ranked(&history).first()?;
                let cost = history.aggregated_cost(best, Some(stage.budget()))?;
                Some(Incumbent {
                    config_id: best,
                    cost,
                })
            })
    }
}

impl<M> core::fmt::Debug for Intensifier<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Intensifier")
            .field("store", &self.store)
            .field("stages", &self.stages)
            .field("engine", &self.engine)
            .field("seeds", &self.seeds)
            .field("instances", &self.instances)
            .field("run_stopping", &self.run_stopping)
            .finish()
    }
}

/// Maps decision errors caused by missing data to "do not stop".
fn recoverable(decision: Result<bool>) -> Result<bool> {
    match decision {
        Ok(stop) => Ok(stop),
        Err(
            _e @ (Error::MissingStatistic { .. }
            | Error::EmptyDataset
            | Error::ModelFit(_)
            | Error::NotFitted),
        ) => {
            trace_warn!(error = %_e, "stopping decision failed, continuing the race");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
