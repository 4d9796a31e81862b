//! Trial keys and the records stored against them.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::storage::ConfigId;
use crate::types::{Budget, TrialStatus};

/// Unique identifier of one evaluation.
///
/// A configuration may be evaluated on several problem instances, with
/// several seeds and at several budgets; each combination is a distinct
/// trial.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialKey {
    /// The evaluated configuration.
    pub config_id: ConfigId,
    /// The problem instance, if the scenario has instances.
    pub instance: Option<String>,
    /// The seed passed to the target algorithm.
    pub seed: Option<u64>,
    /// The fidelity the evaluation ran at.
    pub budget: Option<Budget>,
}

impl TrialKey {
    /// Creates a key with no instance, seed or budget.
    #[must_use]
    pub fn new(config_id: ConfigId) -> Self {
        Self {
            config_id,
            instance: None,
            seed: None,
            budget: None,
        }
    }

    /// Sets the instance.
    #[must_use]
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Sets the seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the budget.
    #[must_use]
    pub fn budget(mut self, budget: impl Into<Budget>) -> Self {
        self.budget = Some(budget.into());
        self
    }
}

impl core::fmt::Display for TrialKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}", self.config_id)?;
        match &self.instance {
            Some(instance) => write!(f, ", instance={instance}")?,
            None => write!(f, ", instance=-")?,
        }
        match self.seed {
            Some(seed) => write!(f, ", seed={seed}")?,
            None => write!(f, ", seed=-")?,
        }
        match self.budget {
            Some(budget) => write!(f, ", budget={budget})"),
            None => write!(f, ", budget=-)"),
        }
    }
}

/// A named auxiliary statistic attached to a trial record.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AttrValue {
    /// An integer statistic (e.g. fold or sample counts).
    Int(i64),
    /// A floating-point statistic.
    Float(f64),
    /// A string annotation.
    String(String),
    /// A boolean flag.
    Bool(bool),
}

impl AttrValue {
    /// Returns the statistic as `f64` if it is numeric.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::String(_) | Self::Bool(_) => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// The observed result of one evaluation.
///
/// Records are written once and never mutated. A failed evaluation keeps
/// its record (with [`TrialStatus::Failure`] and no cost) so the ledger
/// remembers it was attempted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialRecord {
    /// The observed cost (lower is better); `None` for failures.
    pub cost: Option<f64>,
    /// Whether the evaluation succeeded.
    pub status: TrialStatus,
    /// Named auxiliary statistics (noise estimates, sample counts, ...).
    #[cfg_attr(feature = "serde", serde(default))]
    pub statistics: HashMap<String, AttrValue>,
}

impl TrialRecord {
    /// Creates a successful record with the given cost.
    #[must_use]
    pub fn success(cost: f64) -> Self {
        Self {
            cost: Some(cost),
            status: TrialStatus::Success,
            statistics: HashMap::new(),
        }
    }

    /// Creates a failure record. The failure message is kept as the
    /// `"error"` statistic.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        let mut statistics = HashMap::new();
        statistics.insert("error".to_owned(), AttrValue::String(message.into()));
        Self {
            cost: None,
            status: TrialStatus::Failure,
            statistics,
        }
    }

    /// Attaches a named statistic.
    #[must_use]
    pub fn with_statistic(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.statistics.insert(name.into(), value.into());
        self
    }

    /// Returns the numeric statistic named `name`, if present.
    #[must_use]
    pub fn statistic(&self, name: &str) -> Option<f64> {
        self.statistics.get(name).and_then(AttrValue::as_f64)
    }

    /// Returns the cost if the evaluation succeeded.
    #[must_use]
    pub fn successful_cost(&self) -> Option<f64> {
        match self.status {
            TrialStatus::Success => self.cost,
            TrialStatus::Failure => None,
        }
    }
}
