//! Statistically grounded stopping decisions.
//!
//! The [`StoppingEngine`] compares the statistical error of the best
//! empirical cost against the regret the surrogate model still admits. If
//! sampling noise already exceeds the gap between the most pessimistic good
//! configuration and the most optimistic one, further evaluation cannot
//! meaningfully change the outcome.
//!
//! # Decisions
//!
//! - [`should_stage_stop`](StoppingEngine::should_stage_stop): the error is
//!   the mean noise annotation (`statistic_name`) of the best alive
//!   configurations at the stage budget. The model is fitted on the trials
//!   at that budget, and the regret is computed over the best
//!   `upper_bound_estimation_rate` of the configurations evaluated there.
//! - [`should_run_stop`](StoppingEngine::should_run_stop): the error is
//!   `factor · std²` of the tracked incumbent (see [`correction_factor`]),
//!   recomputed whenever the incumbent improves or gains a sample. The
//!   model is fitted on the whole ledger and the regret computed over
//!   every evaluated configuration.
//!
//! Both use the same rule: stop iff `error >= regret` or
//! `|error - regret| < epsilon`. The stage tolerance defaults to `1e-4`,
//! the run tolerance to `0`, which gives plain `regret <= error`.
//!
//! No decision stops before a model has been fitted: with no (or too few)
//! encoded rows both return `false`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use intensify::encoder::Encoder;
//! use intensify::space::SearchSpace;
//! use intensify::stage::Stage;
//! use intensify::stopping::{StoppingConfig, StoppingEngine};
//! use intensify::storage::TrialStore;
//! use intensify::surrogate::GaussianProcess;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let space = Arc::new(SearchSpace::builder().float("x", 0.0, 1.0).build().unwrap());
//! let store = TrialStore::new();
//! let mut ids = Vec::new();
//! for i in 0..6 {
//!     let x = f64::from(i) / 5.0;
//!     let id = store.register(Configuration::new().with("x", ParamValue::Float(x)));
//!     let record = TrialRecord::success(x * x).with_statistic("statistical_error", 0.5);
//!     store.add(TrialKey::new(id).seed(0).budget(1.0), record).unwrap();
//!     ids.push(id);
//! }
//!
//! let config = StoppingConfig::builder().n_points_lcb(50).seed(1).build();
//! let mut engine = StoppingEngine::new(GaussianProcess::new(), Encoder::new(space), config);
//! let stage = Stage::new(0, 1.0, ids, 2).unwrap();
//!
//! // A noise level of 0.5 dwarfs the remaining regret on a cost range of 1.
//! assert!(engine.should_stage_stop(&store.snapshot(), &stage).unwrap());
//! ```

mod config;
mod observer;
#[cfg(feature = "async")]
mod shared;
mod statistics;

pub use config::{StoppingConfig, StoppingConfigBuilder};
pub use observer::{EventLog, Observer, ObserverError, StopEvent, StopScope};
#[cfg(feature = "async")]
pub use shared::SharedStoppingEngine;
pub use statistics::correction_factor;

use crate::acquisition::{
    BoundKind, BoundSummary, ConfidenceBound, LowerBoundPolicy, Marginalization, candidate_pool,
};
use crate::encoder::{EncodedData, Encoder};
use crate::error::{Error, Result};
use crate::stage::Stage;
use crate::storage::{ConfigId, TrialHistory};
use crate::surrogate::SurrogateModel;

/// The incumbent the run-level error was last computed for.
#[derive(Clone, Copy, Debug)]
struct TrackedIncumbent {
    config_id: ConfigId,
    cost: f64,
    n_records: usize,
    statistical_error: f64,
}

/// Decides whether a stage, or the whole run, should stop.
///
/// The engine owns its surrogate model and encoder; both are injected at
/// construction. Each decision retrains the model on the data it needs
/// before computing bounds, so a decision never uses a stale fit.
pub struct StoppingEngine<M> {
    model: M,
    encoder: Encoder,
    config: StoppingConfig,
    lcb: ConfidenceBound,
    ucb: ConfidenceBound,
    run_bound: ConfidenceBound,
    rng: fastrand::Rng,
    observers: Vec<Box<dyn Observer>>,
    incumbent: Option<TrackedIncumbent>,
    n_fits: usize,
}

impl<M: SurrogateModel> StoppingEngine<M> {
    /// Creates an engine around `model` and `encoder`.
    ///
    /// Random configurations for the lower-bound pool are drawn from the
    /// encoder's space.
    ///
    /// The marginalization mode follows the encoder's layout: an encoder
    /// with an instance context column always predicts
    /// [`OverInstances`](Marginalization::OverInstances), one without always
    /// predicts plain rows. A mismatching setting is overridden with a
    /// warning, see [`StoppingConfig::marginalization`].
    #[must_use]
    pub fn new(model: M, encoder: Encoder, mut config: StoppingConfig) -> Self {
        config.marginalization = resolve_marginalization(config.marginalization, &encoder);
        let stage_bound = ConfidenceBound::new(config.beta)
            .update_beta(config.update_beta)
            .srinivas_scaling(config.srinivas_scaling);
        let rng = config
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Self {
            model,
            encoder,
            lcb: stage_bound.clone(),
            ucb: stage_bound,
            run_bound: ConfidenceBound::new(config.run_beta),
            config,
            rng,
            observers: Vec::new(),
            incumbent: None,
            n_fits: 0,
        }
    }

    /// Registers an observer notified after every decision.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Registers an observer notified after every decision.
    pub fn add_observer(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The injected model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The injected encoder.
    #[must_use]
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// The settings.
    #[must_use]
    pub fn config(&self) -> &StoppingConfig {
        &self.config
    }

    /// Number of successful model fits so far.
    #[must_use]
    pub fn n_fits(&self) -> usize {
        self.n_fits
    }

    /// Whether the stage can stop: its statistical error is at least the
    /// model regret at the stage budget, or within `stage_epsilon` of it.
    ///
    /// Returns `false` when no configuration of the stage has a successful
    /// trial at the budget yet, or when there are too few rows to fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatistic`] if a trial lacks its noise
    /// annotation and no fallback threshold is set. Encoding and prediction
    /// errors are propagated.
    pub fn should_stage_stop(&mut self, history: &TrialHistory, stage: &Stage) -> Result<bool> {
        let budget = stage.budget();
        let Some(statistical_error) = statistics::stage_error(history, stage, &self.config)? else {
            trace_debug!(stage = stage.id(), "no evaluated configuration in stage yet");
            return Ok(false);
        };

        let data = self.encoder.transform(history, Some(&[budget]))?;
        if !self.fit(&data)? {
            return Ok(false);
        }

        let pool = candidate_pool(
            history,
            Some(budget),
            self.config.upper_bound_estimation_rate,
        )?;
        let dims = self.encoder.n_columns();
        self.lcb.update(data.len(), dims);
        self.ucb.update(data.len(), dims);
        let Some(summary) = self.summarize(history, &pool, &data, false)? else {
            return Ok(false);
        };

        let regret = summary.regret();
        let triggered = statistical_error >= regret
            || (statistical_error - regret).abs() < self.config.stage_epsilon;

        trace_info!(
            stage = stage.id(),
            budget = %budget,
            statistical_error,
            regret,
            triggered,
            "stage stopping decision"
        );
        self.emit(StopEvent {
            scope: StopScope::Stage {
                id: stage.id(),
                budget,
            },
            min_lcb: summary.min_lcb,
            min_ucb: summary.min_ucb,
            statistical_error,
            regret,
            beta: self.ucb.beta(),
            triggered,
        });
        Ok(triggered)
    }

    /// Whether the whole run can stop: the model regret over every
    /// evaluated configuration is at most the incumbent's statistical error
    /// (within `run_epsilon`).
    ///
    /// Returns `false` until there is an incumbent and enough rows to fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingStatistic`] if the incumbent lacks its
    /// cross-validation annotations and no fallback threshold is set.
    /// Encoding and prediction errors are propagated.
    pub fn should_run_stop(&mut self, history: &TrialHistory) -> Result<bool> {
        let Some(incumbent) = history.incumbent() else {
            return Ok(false);
        };

        let data = self.encoder.transform(history, None)?;
        if data.len() < self.config.min_trials.max(1) {
            return Ok(false);
        }

        // New samples of an unchanged incumbent also refresh its error
        let n_records = history.successful_records(incumbent.config_id, None).count();
        let statistical_error = match self.incumbent {
            Some(t)
                if t.config_id == incumbent.config_id
                    && t.cost.total_cmp(&incumbent.cost).is_eq()
                    && t.n_records == n_records =>
            {
                t.statistical_error
            }
            _ => {
                let error =
                    statistics::incumbent_error(history, incumbent.config_id, &self.config)?;
                trace_debug!(config = %incumbent.config_id, error, "incumbent statistical error");
                self.incumbent = Some(TrackedIncumbent {
                    config_id: incumbent.config_id,
                    cost: incumbent.cost,
                    n_records,
                    statistical_error: error,
                });
                error
            }
        };

        if !self.fit(&data)? {
            return Ok(false);
        }

        let pool = candidate_pool(history, None, self.config.run_upper_bound_estimation_rate)?;
        self.run_bound.update(data.len(), self.encoder.n_columns());
        let Some(summary) = self.summarize(history, &pool, &data, true)? else {
            return Ok(false);
        };

        let regret = summary.regret();
        let triggered = regret <= statistical_error
            || (statistical_error - regret).abs() < self.config.run_epsilon;

        trace_info!(
            incumbent = %incumbent.config_id,
            statistical_error,
            regret,
            triggered,
            "run stopping decision"
        );
        self.emit(StopEvent {
            scope: StopScope::Run {
                incumbent: incumbent.config_id,
            },
            min_lcb: summary.min_lcb,
            min_ucb: summary.min_ucb,
            statistical_error,
            regret,
            beta: self.run_bound.beta(),
            triggered,
        });
        Ok(triggered)
    }

    /// Trains the model. Returns `false` when there are too few rows.
    fn fit(&mut self, data: &EncodedData) -> Result<bool> {
        if data.len() < self.config.min_trials.max(1) {
            trace_debug!(rows = data.len(), "too few rows to fit the surrogate model");
            return Ok(false);
        }
        match self.model.train(&data.x, &data.y) {
            Ok(()) => {
                self.n_fits += 1;
                Ok(true)
            }
            Err(Error::EmptyDataset) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Bounds over the pool, mapped back to cost units.
    fn summarize(
        &mut self,
        history: &TrialHistory,
        pool: &[ConfigId],
        data: &EncodedData,
        run_level: bool,
    ) -> Result<Option<BoundSummary>> {
        if pool.is_empty() {
            return Ok(None);
        }
        let mut rows = Vec::with_capacity(pool.len() + self.config.n_points_lcb);
        for &id in pool {
            rows.push(self.encoder.encode(history.config(id)?)?);
        }

        let contexts: &[Vec<f64>] = match self.config.marginalization {
            Marginalization::None => &[],
            Marginalization::OverInstances => &data.contexts,
        };
        let (lcb, ucb) = if run_level {
            (&self.run_bound, &self.run_bound)
        } else {
            (&self.lcb, &self.ucb)
        };

        let ucb_values = ucb.compute(
            BoundKind::Upper,
            &self.model,
            &rows,
            self.config.marginalization,
            contexts,
        )?;

        let min_lcb = match self.config.lower_bound {
            LowerBoundPolicy::Derived => {
                let space = self.encoder.space();
                for _ in 0..self.config.n_points_lcb {
                    let sample = space.sample(&mut self.rng);
                    rows.push(self.encoder.encode(&sample)?);
                }
                let lcb_values = lcb.compute(
                    BoundKind::Lower,
                    &self.model,
                    &rows,
                    self.config.marginalization,
                    contexts,
                )?;
                lcb_values.iter().copied().reduce(f64::min)
            }
            LowerBoundPolicy::FixedZero => None,
        };
        let min_ucb = ucb_values.iter().copied().reduce(f64::min);
        let Some(min_ucb) = min_ucb else {
            return Ok(None);
        };

        let summary = match min_lcb {
            Some(min_lcb) => BoundSummary { min_lcb, min_ucb }
                .map(|v| self.encoder.inverse_response_value(v)),
            None => BoundSummary {
                min_lcb: 0.0,
                min_ucb: self.encoder.inverse_response_value(min_ucb),
            },
        };
        Ok(Some(summary.clamped()))
    }

    fn emit(&self, event: StopEvent) {
        observer::notify(&self.observers, &event);
    }
}

fn resolve_marginalization(requested: Marginalization, encoder: &Encoder) -> Marginalization {
    let required = if encoder.has_instance_context() {
        Marginalization::OverInstances
    } else {
        Marginalization::None
    };
    if requested != required {
        trace_warn!(
            requested = ?requested,
            used = ?required,
            "marginalization does not match the encoder layout"
        );
    }
    required
}

impl<M> core::fmt::Debug for StoppingEngine<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoppingEngine")
            .field("encoder", &self.encoder)
            .field("config", &self.config)
            .field("n_observers", &self.observers.len())
            .field("n_fits", &self.n_fits)
            .finish_non_exhaustive()
    }
}
