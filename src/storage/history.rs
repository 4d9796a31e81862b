use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::Configuration;
use crate::trial::{TrialKey, TrialRecord};
use crate::types::{Aggregation, Budget};

/// Dense identifier of a registered configuration, in order of discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ConfigId(u64);

impl ConfigId {
    /// Wraps a raw id.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "config_{}", self.0)
    }
}

/// The best configuration seen so far and the aggregated cost it reached.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Incumbent {
    /// The incumbent configuration.
    pub config_id: ConfigId,
    /// Its aggregated cost at the time it became (or improved as) incumbent.
    pub cost: f64,
}

/// An immutable view of the ledger.
///
/// Obtained from [`Storage::snapshot`](super::Storage::snapshot); every
/// query on it sees one consistent state no matter what writers do
/// concurrently.
#[derive(Clone, Debug, Default)]
pub struct TrialHistory {
    aggregation: Aggregation,
    configs: Vec<Configuration>,
    config_index: HashMap<Configuration, ConfigId>,
    trials: Vec<(TrialKey, TrialRecord)>,
    index: HashMap<TrialKey, usize>,
    by_config: HashMap<ConfigId, Vec<usize>>,
    incumbent: Option<Incumbent>,
}

impl TrialHistory {
    /// Creates an empty history aggregating repeated costs with `aggregation`.
    #[must_use]
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            ..Self::default()
        }
    }

    /// Registers `config`, returning its existing id if it is already known.
    pub(crate) fn register(&mut self, config: Configuration) -> ConfigId {
        if let Some(&id) = self.config_index.get(&config) {
            return id;
        }
        let id = ConfigId(self.configs.len() as u64);
        self.config_index.insert(config.clone(), id);
        self.configs.push(config);
        id
    }

    /// Appends a trial. Nothing is modified when an error is returned.
    pub(crate) fn insert(&mut self, key: TrialKey, record: TrialRecord) -> Result<()> {
        if self.index.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        if self.config(key.config_id).is_err() {
            return Err(Error::NotFound(key.config_id.to_string()));
        }
        let config_id = key.config_id;
        let position = self.trials.len();
        self.index.insert(key.clone(), position);
        self.by_config.entry(config_id).or_default().push(position);
        let succeeded = record.successful_cost().is_some();
        self.trials.push((key, record));
        if succeeded {
            self.update_incumbent(config_id);
        }
        Ok(())
    }

    fn update_incumbent(&mut self, config_id: ConfigId) {
        let Some(cost) = self.aggregated_cost(config_id, None) else {
            return;
        };
        let improves = self.incumbent.is_none_or(|inc| cost < inc.cost);
        if improves {
            trace_debug!(config = %config_id, cost, "incumbent improved");
            self.incumbent = Some(Incumbent { config_id, cost });
        }
    }

    /// The aggregation applied to repeated observations.
    #[must_use]
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Number of recorded trials (successes and failures).
    #[must_use]
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Returns `true` if no trial has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Number of registered configurations.
    #[must_use]
    pub fn n_configs(&self) -> usize {
        self.configs.len()
    }

    /// Returns the record stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key was never added.
    pub fn get(&self, key: &TrialKey) -> Result<&TrialRecord> {
        self.index
            .get(key)
            .map(|&i| &self.trials[i].1)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Returns the configuration registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no configuration has this id.
    #[allow(clippy::cast_possible_truncation)]
    pub fn config(&self, id: ConfigId) -> Result<&Configuration> {
        self.configs
            .get(id.0 as usize)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Returns the id `config` was registered under.
    #[must_use]
    pub fn config_id(&self, config: &Configuration) -> Option<ConfigId> {
        self.config_index.get(config).copied()
    }

    /// Iterates over registered configurations in discovery order.
    pub fn configs(&self) -> impl Iterator<Item = (ConfigId, &Configuration)> {
        self.configs
            .iter()
            .enumerate()
            .map(|(i, c)| (ConfigId(i as u64), c))
    }

    /// Iterates over all trials in insertion order.
    pub fn trials(&self) -> impl Iterator<Item = (&TrialKey, &TrialRecord)> {
        self.trials.iter().map(|(k, r)| (k, r))
    }

    /// Iterates lazily over the keys of `config_id`'s trials.
    ///
    /// With `budget = Some(b)` only trials at budget `b` are returned. With
    /// `highest_budget_only`, a configuration evaluated at several budgets
    /// on the same `(instance, seed)` contributes only its highest-budget
    /// trial.
    pub fn trials_for(
        &self,
        config_id: ConfigId,
        budget: Option<Budget>,
        highest_budget_only: bool,
    ) -> impl Iterator<Item = &TrialKey> + '_ {
        let filter = KeyFilter::new(self, config_id, budget, highest_budget_only);
        self.positions(config_id)
            .iter()
            .map(|&i| &self.trials[i].0)
            .filter(move |k| filter.matches(k))
    }

    pub(super) fn positions(&self, config_id: ConfigId) -> &[usize] {
        self.by_config.get(&config_id).map_or(&[], Vec::as_slice)
    }

    pub(super) fn key_at(&self, position: usize) -> &TrialKey {
        &self.trials[position].0
    }

    /// Successful costs of `config_id`, optionally restricted to one budget.
    ///
    /// Without a budget, only the highest budget per `(instance, seed)`
    /// contributes.
    #[must_use]
    pub fn costs(&self, config_id: ConfigId, budget: Option<Budget>) -> Vec<f64> {
        self.trials_for(config_id, budget, budget.is_none())
            .filter_map(|k| self.index.get(k))
            .filter_map(|&i| self.trials[i].1.successful_cost())
            .collect()
    }

    /// Aggregated successful cost of `config_id`; `None` when it has no
    /// successful trial in scope.
    #[must_use]
    pub fn aggregated_cost(&self, config_id: ConfigId, budget: Option<Budget>) -> Option<f64> {
        self.aggregation.apply(&self.costs(config_id, budget))
    }

    /// Records of `config_id` at `budget` that succeeded.
    pub fn successful_records(
        &self,
        config_id: ConfigId,
        budget: Option<Budget>,
    ) -> impl Iterator<Item = &TrialRecord> + '_ {
        self.trials_for(config_id, budget, budget.is_none())
            .filter_map(|k| self.index.get(k))
            .map(|&i| &self.trials[i].1)
            .filter(|r| r.successful_cost().is_some())
    }

    /// Configurations with at least one successful trial at `budget` (or at
    /// any budget for `None`), in discovery order.
    #[must_use]
    pub fn configs_at_budget(&self, budget: Option<Budget>) -> Vec<ConfigId> {
        let mut ids: Vec<ConfigId> = self
            .by_config
            .keys()
            .copied()
            .filter(|&id| self.successful_records(id, budget).next().is_some())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Distinct budgets present in the ledger, ascending.
    #[must_use]
    pub fn budgets(&self) -> Vec<Budget> {
        let mut budgets: Vec<Budget> = self.trials.iter().filter_map(|(k, _)| k.budget).collect();
        budgets.sort_unstable();
        budgets.dedup();
        budgets
    }

    /// The tracked incumbent.
    ///
    /// Updated on every successful append and only when the aggregated cost
    /// strictly improves on the previous incumbent's, so the reported cost
    /// never gets worse over the ledger's lifetime.
    #[must_use]
    pub fn incumbent(&self) -> Option<Incumbent> {
        self.incumbent
    }

    /// The configuration minimizing `aggregation` over the current ledger.
    ///
    /// Unlike [`incumbent`](Self::incumbent) this is recomputed from scratch
    /// and may move to a worse cost when new observations arrive. Ties go to
    /// the earliest discovered configuration.
    #[must_use]
    pub fn best_config_by(&self, aggregation: Aggregation) -> Option<Incumbent> {
        let mut best: Option<Incumbent> = None;
        for id in self.configs_at_budget(None) {
            let Some(cost) = aggregation.apply(&self.costs(id, None)) else {
                continue;
            };
            if best.is_none_or(|b| cost < b.cost) {
                best = Some(Incumbent { config_id: id, cost });
            }
        }
        best
    }
}

type RunSlot = (Option<String>, Option<u64>);

/// Budget predicate shared by the borrowed and the owning key iterators.
#[derive(Debug)]
pub(super) struct KeyFilter {
    budget: Option<Budget>,
    highest: Option<HashMap<RunSlot, Option<Budget>>>,
}

impl KeyFilter {
    pub(super) fn new(
        history: &TrialHistory,
        config_id: ConfigId,
        budget: Option<Budget>,
        highest_budget_only: bool,
    ) -> Self {
        let highest = highest_budget_only.then(|| {
            let mut highest: HashMap<RunSlot, Option<Budget>> = HashMap::new();
            for &i in history.positions(config_id) {
                let key = history.key_at(i);
                let slot = highest
                    .entry((key.instance.clone(), key.seed))
                    .or_insert(key.budget);
                if key.budget > *slot {
                    *slot = key.budget;
                }
            }
            highest
        });
        Self { budget, highest }
    }

    pub(super) fn matches(&self, key: &TrialKey) -> bool {
        if self.budget.is_some() && key.budget != self.budget {
            return false;
        }
        self.highest.as_ref().is_none_or(|h| {
            h.get(&(key.instance.clone(), key.seed))
                .is_some_and(|&b| b == key.budget)
        })
    }
}
