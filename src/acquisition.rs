//! Confidence bounds over a candidate pool.
//!
//! A [`ConfidenceBound`] turns a model's predictive mean and standard
//! deviation into `mean ∓ sqrt(beta) · std`. The coefficient can grow with
//! the amount of data and the dimensionality so that the bound stays valid
//! as observations accrue:
//!
//! | Mode | Effective beta at `t` observations in `d` dimensions |
//! |------|------------------------------------------------------|
//! | fixed | `beta` |
//! | adaptive | `2 ln(d t² / beta)` |
//! | adaptive + Srinivas | `2 ln(d t² π² / (6 beta))` |
//!
//! The effective value is clamped at zero, and `t = 0` keeps `beta`.
//!
//! The regret of a pool is the gap between its smallest upper bound and its
//! smallest lower bound (independent minima), see [`BoundSummary`].

use crate::error::{Error, Result};
use crate::storage::{ConfigId, TrialHistory};
use crate::surrogate::{Prediction, SurrogateModel};
use crate::types::{Aggregation, Budget};

/// Which side of the predictive distribution a bound describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundKind {
    /// `mean - sqrt(beta) · std`: an optimistic estimate of the cost.
    Lower,
    /// `mean + sqrt(beta) · std`: a pessimistic estimate of the cost.
    Upper,
}

/// How the lower end of the regret is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LowerBoundPolicy {
    /// Minimum LCB over the pool and random samples of the space.
    #[default]
    Derived,
    /// A fixed lower bound of `0.0`, for costs known to be non-negative.
    FixedZero,
}

/// Whether predictions average out the encoder's context columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Marginalization {
    /// Rows are predicted as they are.
    #[default]
    None,
    /// Rows are extended with each instance context and averaged with
    /// [`SurrogateModel::predict_marginalized`].
    OverInstances,
}

/// Lower/upper confidence bound with an adaptive coefficient.
#[derive(Clone, Debug)]
pub struct ConfidenceBound {
    beta: f64,
    update_beta: bool,
    srinivas_scaling: bool,
    beta_t: f64,
}

impl ConfidenceBound {
    /// Creates a bound with coefficient `beta`, adaptation disabled.
    ///
    /// # Panics
    ///
    /// Panics if `beta` is not strictly positive.
    #[must_use]
    pub fn new(beta: f64) -> Self {
        assert!(beta > 0.0, "beta must be positive, got {beta}");
        Self {
            beta,
            update_beta: false,
            srinivas_scaling: false,
            beta_t: beta,
        }
    }

    /// Enables growth of beta with the number of observations.
    #[must_use]
    pub fn update_beta(mut self, enabled: bool) -> Self {
        self.update_beta = enabled;
        self
    }

    /// Enables the `π² / 6` scaling of the adaptive coefficient.
    #[must_use]
    pub fn srinivas_scaling(mut self, enabled: bool) -> Self {
        self.srinivas_scaling = enabled;
        self
    }

    /// The configured base coefficient.
    #[must_use]
    pub fn base_beta(&self) -> f64 {
        self.beta
    }

    /// The effective coefficient after the last [`update`](Self::update).
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta_t
    }

    /// Recomputes the effective coefficient for `num_data` observations in
    /// `dims` dimensions.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&mut self, num_data: usize, dims: usize) {
        if !self.update_beta || num_data == 0 {
            self.beta_t = self.beta;
            return;
        }
        let t = num_data as f64;
        let d = dims as f64;
        let raw = if self.srinivas_scaling {
            2.0 * (d * t * t * core::f64::consts::PI.powi(2) / (6.0 * self.beta)).ln()
        } else {
            2.0 * (d * t * t / self.beta).ln()
        };
        // ln(0) is -inf for zero dims; NaN never survives max()
        self.beta_t = raw.max(0.0);
        trace_debug!(num_data, dims, beta = self.beta_t, "updated confidence coefficient");
    }

    /// Applies the bound to one predictive mean and standard deviation.
    #[must_use]
    pub fn apply(&self, kind: BoundKind, mean: f64, std: f64) -> f64 {
        let width = self.beta_t.sqrt() * std;
        match kind {
            BoundKind::Lower => mean - width,
            BoundKind::Upper => mean + width,
        }
    }

    /// Bound of each row of a prediction.
    #[must_use]
    ///
    /// Rows past the shorter of `mean` and `variance` are dropped.
    pub fn bounds(&self, kind: BoundKind, prediction: &Prediction) -> Vec<f64> {
        prediction
            .mean
            .iter()
            .zip(&prediction.variance)
            .map(|(&mean, &variance)| self.apply(kind, mean, variance.max(0.0).sqrt()))
            .collect()
    }

    /// Predicts `candidates` with `model` and returns their bounds.
    ///
    /// With [`Marginalization::OverInstances`] the rows are averaged over
    /// `contexts`.
    ///
    /// # Errors
    ///
    /// Propagates prediction errors from the model, and returns
    /// [`Error::DimensionMismatch`] if the model does not return one mean
    /// and one variance per candidate.
    pub fn compute<M: SurrogateModel + ?Sized>(
        &self,
        kind: BoundKind,
        model: &M,
        candidates: &[Vec<f64>],
        marginalization: Marginalization,
        contexts: &[Vec<f64>],
    ) -> Result<Vec<f64>> {
        let prediction = match marginalization {
            Marginalization::None => model.predict(candidates)?,
            Marginalization::OverInstances => model.predict_marginalized(candidates, contexts)?,
        };
        for got in [prediction.mean.len(), prediction.variance.len()] {
            if got != candidates.len() {
                return Err(Error::DimensionMismatch {
                    expected: candidates.len(),
                    got,
                });
            }
        }
        Ok(self.bounds(kind, &prediction))
    }
}

/// Minimum lower and upper bound over a pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundSummary {
    /// Smallest lower confidence bound.
    pub min_lcb: f64,
    /// Smallest upper confidence bound.
    pub min_ucb: f64,
}

impl BoundSummary {
    /// Summarizes independent minima of two bound lists. Returns `None` if
    /// either list is empty.
    #[must_use]
    pub fn from_bounds(lcb: &[f64], ucb: &[f64]) -> Option<Self> {
        let min = |v: &[f64]| v.iter().copied().reduce(f64::min);
        Some(Self {
            min_lcb: min(lcb)?,
            min_ucb: min(ucb)?,
        })
    }

    /// Checks that the smallest upper bound is not below the smallest
    /// lower bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentBound`] if it is.
    pub fn check(&self) -> Result<()> {
        if self.min_ucb < self.min_lcb {
            return Err(Error::InconsistentBound {
                min_lcb: self.min_lcb,
                min_ucb: self.min_ucb,
            });
        }
        Ok(())
    }

    /// Returns a summary with `min_lcb <= min_ucb`, lowering `min_lcb` to
    /// `min_ucb` (and warning) when the model produced crossed bounds.
    #[must_use]
    pub fn clamped(self) -> Self {
        match self.check() {
            Ok(()) => self,
            Err(_e) => {
                trace_warn!(error = %_e, "clamping regret to zero");
                Self {
                    min_lcb: self.min_ucb,
                    ..self
                }
            }
        }
    }

    /// `min_ucb - min_lcb`, clamped to zero for crossed bounds.
    #[must_use]
    pub fn regret(&self) -> f64 {
        let clamped = self.clamped();
        (clamped.min_ucb - clamped.min_lcb).max(0.0)
    }

    /// Maps both bounds through `f`, e.g. back to cost units.
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            min_lcb: f(self.min_lcb),
            min_ucb: f(self.min_ucb),
        }
    }
}

/// The best fraction of configurations evaluated at `budget`.
///
/// Configurations with a successful trial at `budget` (any budget, highest
/// per run, for `None`) are ranked by mean cost, ties by [`ConfigId`], and
/// the first `round(n · rate)` are kept, at least one and at most all. An
/// empty ledger yields an empty pool.
///
/// # Errors
///
/// Returns [`Error::InvalidRate`] unless `0 < rate <= 1`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn candidate_pool(
    history: &TrialHistory,
    budget: Option<Budget>,
    rate: f64,
) -> Result<Vec<ConfigId>> {
    if !(rate > 0.0 && rate <= 1.0) {
        return Err(Error::InvalidRate(rate));
    }
    let mut ranked: Vec<(f64, ConfigId)> = history
        .configs_at_budget(budget)
        .into_iter()
        .filter_map(|id| {
            Aggregation::Mean
                .apply(&history.costs(id, budget))
                .map(|cost| (cost, id))
        })
        .collect();
    if ranked.is_empty() {
        return Ok(Vec::new());
    }
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let n = ranked.len();
    let keep = ((n as f64 * rate).round() as usize).clamp(1, n);
    Ok(ranked.into_iter().take(keep).map(|(_, id)| id).collect())
}
