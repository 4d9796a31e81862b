//! Racing stages over increasing budgets.
//!
//! A [`StageManager`] races a set of configurations along a budget ladder.
//! Every rung is one [`Stage`]: all alive configurations are evaluated at the
//! stage's budget, and the best `amount_configs_to_yield` of them move on to
//! the next rung.
//!
//! With `min_budget=1`, `max_budget=27`, `eta=3` and 27 configurations:
//!
//! | Rung | Budget | Alive | Survivors |
//! |------|--------|-------|-----------|
//! | 0 | 1 | 27 | 9 |
//! | 1 | 3 | 9 | 3 |
//! | 2 | 9 | 3 | 1 |
//! | 3 | 27 | 1 | - |
//!
//! Each stage moves through
//! `Created -> Running -> Evaluated -> {Promoted | Stopped | Exhausted}`.
//! A stage without configurations is `Exhausted` from the start, and the
//! stage at the last rung becomes `Exhausted` instead of `Promoted`.
//!
//! ```
//! use intensify::stage::{StageManager, StageState};
//! use intensify::storage::TrialStore;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let store = TrialStore::new();
//! let ids = store.register_all(
//!     (0..3).map(|i| Configuration::new().with("i", ParamValue::Int(i))),
//! );
//!
//! let mut stages = StageManager::builder().budgets([10.0, 20.0]).eta(1.5).build();
//! stages.start(ids.iter().copied()).unwrap();
//! stages.mark_running().unwrap();
//! for (&id, cost) in ids.iter().zip([1.0, 0.5, 2.0]) {
//!     store.add(TrialKey::new(id).budget(10.0), TrialRecord::success(cost)).unwrap();
//! }
//!
//! assert_eq!(stages.refresh(&store.snapshot()).unwrap(), StageState::Evaluated);
//! let next = stages.promote(&store.snapshot()).unwrap().unwrap();
//! assert_eq!(next.configs(), &[ids[1], ids[0]]);
//! ```

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::storage::{ConfigId, TrialHistory};
use crate::types::Budget;

/// Lifecycle of a [`Stage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Configurations assigned, nothing dispatched yet.
    Created,
    /// Evaluations are being dispatched.
    Running,
    /// Every alive configuration has at least one record at the budget.
    Evaluated,
    /// Survivors moved on to the next stage.
    Promoted,
    /// The race was halted at this stage.
    Stopped,
    /// Nothing left to race: no configurations, or no higher budget.
    Exhausted,
}

impl StageState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Promoted | Self::Stopped | Self::Exhausted)
    }

    fn can_become(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Running | Self::Exhausted)
                | (Self::Running, Self::Evaluated)
                | (
                    Self::Evaluated,
                    Self::Promoted | Self::Stopped | Self::Exhausted
                )
        )
    }
}

/// One racing round.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    id: usize,
    budget: Budget,
    configs: Vec<ConfigId>,
    amount_configs_to_yield: usize,
    state: StageState,
}

impl Stage {
    /// Creates a stage racing `configs` at `budget`.
    ///
    /// A stage without configurations starts out
    /// [`Exhausted`](StageState::Exhausted).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStage`] if more survivors are requested than
    /// there are configurations.
    pub fn new(
        id: usize,
        budget: impl Into<Budget>,
        configs: Vec<ConfigId>,
        amount_configs_to_yield: usize,
    ) -> Result<Self> {
        if amount_configs_to_yield > configs.len() {
            return Err(Error::InvalidStage {
                survivors: amount_configs_to_yield,
                alive: configs.len(),
            });
        }
        let state = if configs.is_empty() {
            StageState::Exhausted
        } else {
            StageState::Created
        };
        Ok(Self {
            id,
            budget: budget.into(),
            configs,
            amount_configs_to_yield,
            state,
        })
    }

    /// Position of the stage in the race, starting at 0.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// The budget every alive configuration is evaluated at.
    #[must_use]
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Alive configurations in insertion order.
    #[must_use]
    pub fn configs(&self) -> &[ConfigId] {
        &self.configs
    }

    /// How many configurations move on when the stage is promoted.
    #[must_use]
    pub fn amount_configs_to_yield(&self) -> usize {
        self.amount_configs_to_yield
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.state
    }

    fn transition(&mut self, to: StageState) -> Result<()> {
        if !self.state.can_become(to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        trace_debug!(stage = self.id, from = ?self.state, to = ?to, "stage transition");
        self.state = to;
        Ok(())
    }

    /// Returns `true` once every alive configuration has a record
    /// (successful or not) at the stage budget.
    #[must_use]
    pub fn is_evaluated(&self, history: &TrialHistory) -> bool {
        self.configs.iter().all(|&id| {
            history
                .trials_for(id, Some(self.budget), false)
                .next()
                .is_some()
        })
    }

    /// Alive configurations sorted by aggregated cost at the stage budget.
    ///
    /// The sort is stable, so ties keep insertion order; configurations
    /// without a successful trial rank last.
    #[must_use]
    pub fn ranked(&self, history: &TrialHistory) -> Vec<ConfigId> {
        let mut scored: Vec<(Option<f64>, ConfigId)> = self
            .configs
            .iter()
            .map(|&id| (history.aggregated_cost(id, Some(self.budget)), id))
            .collect();
        scored.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => core::cmp::Ordering::Less,
            (None, Some(_)) => core::cmp::Ordering::Greater,
            (None, None) => core::cmp::Ordering::Equal,
        });
        scored.into_iter().map(|(_, id)| id).collect()
    }

    /// The `amount_configs_to_yield` best configurations.
    #[must_use]
    pub fn survivors(&self, history: &TrialHistory) -> Vec<ConfigId> {
        let mut ranked = self.ranked(history);
        ranked.truncate(self.amount_configs_to_yield);
        ranked
    }
}

/// Default reduction factor.
const DEFAULT_ETA: f64 = 3.0;

/// Drives stages along a budget ladder.
#[derive(Clone, Debug)]
pub struct StageManager {
    budgets: Vec<Budget>,
    eta: f64,
    rung: usize,
    current: Option<Stage>,
    finished: Vec<Stage>,
}

impl StageManager {
    /// Returns a builder for the budget ladder.
    #[must_use]
    pub fn builder() -> StageManagerBuilder {
        StageManagerBuilder::default()
    }

    /// The budget ladder, ascending.
    #[must_use]
    pub fn budgets(&self) -> &[Budget] {
        &self.budgets
    }

    /// The reduction factor.
    #[must_use]
    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// The stage currently being raced, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Stage> {
        self.current.as_ref()
    }

    /// Stages that were promoted, in order.
    #[must_use]
    pub fn finished(&self) -> &[Stage] {
        &self.finished
    }

    /// Whether the current race has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current.as_ref().is_none_or(|s| s.state.is_terminal())
    }

    /// Survivors of a stage with `alive` configurations at `rung`:
    /// `max(1, floor(alive / eta))`, all of them at the last rung.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn survivors_for(&self, alive: usize, rung: usize) -> usize {
        if rung + 1 >= self.budgets.len() {
            return alive;
        }
        ((alive as f64 / self.eta).floor() as usize).max(1).min(alive)
    }

    fn stage_at(&self, id: usize, rung: usize, configs: Vec<ConfigId>) -> Result<Stage> {
        let amount = self.survivors_for(configs.len(), rung);
        Stage::new(id, self.budgets[rung], configs, amount)
    }

    fn current_mut(&mut self) -> Result<&mut Stage> {
        self.current
            .as_mut()
            .ok_or_else(|| Error::NotFound("no stage has been started".to_owned()))
    }

    /// Starts a race at the lowest budget.
    ///
    /// Later duplicates in `configs` are dropped, keeping first-occurrence
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the current race has not
    /// finished.
    pub fn start(&mut self, configs: impl IntoIterator<Item = ConfigId>) -> Result<&Stage> {
        if let Some(stage) = &self.current {
            if !stage.state.is_terminal() {
                return Err(Error::InvalidTransition {
                    from: stage.state,
                    to: StageState::Created,
                });
            }
        }
        let mut seen = HashSet::new();
        let unique: Vec<ConfigId> = configs.into_iter().filter(|&id| seen.insert(id)).collect();
        self.rung = 0;
        self.finished.clear();
        let stage = self.stage_at(0, 0, unique)?;
        trace_info!(
            budget = %stage.budget,
            configs = stage.configs.len(),
            "race started"
        );
        Ok(&*self.current.insert(stage))
    }

    /// Marks the current stage as dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the stage is `Created`.
    pub fn mark_running(&mut self) -> Result<()> {
        self.current_mut()?.transition(StageState::Running)
    }

    /// Moves a running stage to `Evaluated` once every alive configuration
    /// has a record at its budget, and returns the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the stage is neither
    /// `Running` nor already `Evaluated`.
    pub fn refresh(&mut self, history: &TrialHistory) -> Result<StageState> {
        let stage = self.current_mut()?;
        match stage.state {
            StageState::Running => {
                if stage.is_evaluated(history) {
                    stage.transition(StageState::Evaluated)?;
                }
                Ok(stage.state)
            }
            StageState::Evaluated => Ok(stage.state),
            from => Err(Error::InvalidTransition {
                from,
                to: StageState::Evaluated,
            }),
        }
    }

    /// Promotes the survivors of an evaluated stage to the next budget.
    ///
    /// Returns the new stage, or `None` if the stage was at the last budget
    /// and the race is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the stage is `Evaluated`.
    pub fn promote(&mut self, history: &TrialHistory) -> Result<Option<&Stage>> {
        let rung = self.rung;
        let last = rung + 1 >= self.budgets.len();
        let stage = self.current_mut()?;
        if last {
            stage.transition(StageState::Exhausted)?;
            trace_info!(stage = stage.id, "race exhausted at the highest budget");
            return Ok(None);
        }
        stage.transition(StageState::Promoted)?;
        let survivors = stage.survivors(history);
        let next_id = stage.id + 1;

        let next = self.stage_at(next_id, rung + 1, survivors)?;
        trace_info!(
            stage = next.id,
            budget = %next.budget,
            configs = next.configs.len(),
            "promoted survivors"
        );
        if let Some(done) = self.current.take() {
            self.finished.push(done);
        }
        self.rung = rung + 1;
        Ok(Some(&*self.current.insert(next)))
    }

    /// Halts the race at an evaluated stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the stage is `Evaluated`.
    pub fn stop(&mut self) -> Result<()> {
        self.current_mut()?.transition(StageState::Stopped)
    }
}

/// Builder for a [`StageManager`].
///
/// The ladder is either explicit ([`budgets`](Self::budgets)) or the
/// geometric sequence `min_budget · eta^k <= max_budget`.
///
/// Defaults: `min_budget=1`, `max_budget=1`, `eta=3`.
#[derive(Clone, Debug, Default)]
pub struct StageManagerBuilder {
    min_budget: Option<f64>,
    max_budget: Option<f64>,
    eta: Option<f64>,
    budgets: Option<Vec<Budget>>,
}

impl StageManagerBuilder {
    /// Sets the budget of the first rung.
    ///
    /// # Panics
    ///
    /// Panics if `b` is not positive.
    #[must_use]
    pub fn min_budget(mut self, b: f64) -> Self {
        assert!(b > 0.0, "min_budget must be > 0, got {b}");
        self.min_budget = Some(b);
        self
    }

    /// Sets the largest budget a rung may use.
    ///
    /// # Panics
    ///
    /// Panics if `b` is not positive.
    #[must_use]
    pub fn max_budget(mut self, b: f64) -> Self {
        assert!(b > 0.0, "max_budget must be > 0, got {b}");
        self.max_budget = Some(b);
        self
    }

    /// Sets the reduction factor: each stage keeps `1/eta` of its configurations.
    ///
    /// # Panics
    ///
    /// Panics if `eta` is not greater than 1.
    #[must_use]
    pub fn eta(mut self, eta: f64) -> Self {
        assert!(eta > 1.0, "eta must be > 1, got {eta}");
        self.eta = Some(eta);
        self
    }

    /// Uses an explicit ladder instead of the geometric one.
    ///
    /// # Panics
    ///
    /// Panics if `budgets` is empty or not strictly increasing.
    #[must_use]
    pub fn budgets(mut self, budgets: impl IntoIterator<Item = impl Into<Budget>>) -> Self {
        let budgets: Vec<Budget> = budgets.into_iter().map(Into::into).collect();
        assert!(!budgets.is_empty(), "budget ladder must not be empty");
        assert!(
            budgets.windows(2).all(|w| w[0] < w[1]),
            "budget ladder must be strictly increasing"
        );
        self.budgets = Some(budgets);
        self
    }

    /// Builds the manager.
    ///
    /// # Panics
    ///
    /// Panics if `min_budget` exceeds `max_budget`.
    #[must_use]
    pub fn build(self) -> StageManager {
        let eta = self.eta.unwrap_or(DEFAULT_ETA);
        let budgets = self.budgets.unwrap_or_else(|| {
            let min = self.min_budget.unwrap_or(1.0);
            let max = self.max_budget.unwrap_or(min);
            assert!(min <= max, "min_budget ({min}) must not exceed max_budget ({max})");
            let mut ladder = Vec::new();
            let mut b = min;
            // Tolerate rounding on the last rung
            while b <= max * (1.0 + 1e-9) {
                ladder.push(Budget::new(b.min(max)));
                b *= eta;
            }
            ladder
        });
        StageManager {
            budgets,
            eta,
            rung: 0,
            current: None,
            finished: Vec::new(),
        }
    }
}
