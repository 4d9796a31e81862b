//! Core types shared across the ledger and the racing engine.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The outcome status of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialStatus {
    /// The evaluation returned a cost.
    Success,
    /// The evaluation failed; the record carries no cost.
    Failure,
}

/// A fidelity level: data fraction, epochs, walltime or any other scalar
/// that trades evaluation cost for measurement precision.
///
/// Budgets are compared and hashed by their IEEE bit pattern (via
/// [`f64::total_cmp`]) so they can be part of a trial key.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Budget(f64);

impl Budget {
    /// Wraps a raw budget value.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Returns the raw budget value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for Budget {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl PartialEq for Budget {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Budget {}

impl PartialOrd for Budget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Budget {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Budget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl core::fmt::Display for Budget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How repeated observations of one configuration collapse to one cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Aggregation {
    /// Arithmetic mean (the default).
    #[default]
    Mean,
    /// Median; the mean of the two middle values for even counts.
    Median,
    /// Best (lowest) observation.
    Min,
    /// Worst (highest) observation.
    Max,
}

impl Aggregation {
    /// Aggregates `costs`. Returns `None` for an empty slice.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn apply(self, costs: &[f64]) -> Option<f64> {
        if costs.is_empty() {
            return None;
        }
        let value = match self {
            Self::Mean => costs.iter().sum::<f64>() / costs.len() as f64,
            Self::Median => {
                let mut sorted = costs.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    f64::midpoint(sorted[mid - 1], sorted[mid])
                } else {
                    sorted[mid]
                }
            }
            Self::Min => costs.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => costs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(value)
    }
}
