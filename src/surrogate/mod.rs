//! The surrogate model seam.
//!
//! The stopping engine only needs a regression model that can be fitted on
//! encoded data and queried for a predictive mean and variance. Any model
//! implementing [`SurrogateModel`] can be injected; a Gaussian process is
//! provided behind the `gp` feature.
//!
//! Context columns (problem instances) are averaged out explicitly through
//! [`SurrogateModel::predict_marginalized`], which callers request through
//! [`Marginalization`](crate::acquisition::Marginalization) rather than by
//! inspecting the model.

#[cfg(feature = "gp")]
mod gp;

#[cfg(feature = "gp")]
pub use gp::{GaussianProcess, GaussianProcessBuilder};

use crate::error::{Error, Result};

/// Predictive mean and variance, one entry per queried row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    /// Predictive means.
    pub mean: Vec<f64>,
    /// Predictive variances (non-negative).
    pub variance: Vec<f64>,
}

impl Prediction {
    /// Number of predicted rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// Returns `true` if nothing was predicted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Predictive standard deviation of row `i`.
    #[must_use]
    pub fn std(&self, i: usize) -> f64 {
        self.variance[i].max(0.0).sqrt()
    }
}

/// A regression model over encoded configurations.
///
/// Implementations must be `Send` so a stopping engine can be moved onto a
/// blocking worker thread.
pub trait SurrogateModel: Send {
    /// Fits the model on `x` (one row per observation) and targets `y`.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::EmptyDataset`] for zero rows,
    /// [`Error::DimensionMismatch`] for ragged input, and
    /// [`Error::ModelFit`] when fitting fails numerically.
    fn train(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// Returns `true` once [`train`](Self::train) has succeeded.
    fn is_fitted(&self) -> bool;

    /// Predicts mean and variance for each row of `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] before training, or
    /// [`Error::DimensionMismatch`] if a row has the wrong width.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Prediction>;

    /// Predicts with context columns averaged out.
    ///
    /// Every row of `x` is extended with each context row in turn and the
    /// predicted means and variances are averaged over the contexts. With
    /// no contexts this is plain [`predict`](Self::predict).
    ///
    /// # Errors
    ///
    /// See [`predict`](Self::predict).
    #[allow(clippy::cast_precision_loss)]
    fn predict_marginalized(&self, x: &[Vec<f64>], contexts: &[Vec<f64>]) -> Result<Prediction> {
        if contexts.is_empty() {
            return self.predict(x);
        }
        let expanded: Vec<Vec<f64>> = x
            .iter()
            .flat_map(|row| {
                contexts.iter().map(move |ctx| {
                    let mut full = row.clone();
                    full.extend_from_slice(ctx);
                    full
                })
            })
            .collect();
        let raw = self.predict(&expanded)?;
        if raw.len() != expanded.len() {
            return Err(Error::DimensionMismatch {
                expected: expanded.len(),
                got: raw.len(),
            });
        }

        let n = contexts.len();
        let mut out = Prediction {
            mean: Vec::with_capacity(x.len()),
            variance: Vec::with_capacity(x.len()),
        };
        for (means, variances) in raw.mean.chunks(n).zip(raw.variance.chunks(n)) {
            out.mean.push(means.iter().sum::<f64>() / n as f64);
            out.variance.push(variances.iter().sum::<f64>() / n as f64);
        }
        Ok(out)
    }
}

impl<M: SurrogateModel + ?Sized> SurrogateModel for Box<M> {
    fn train(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        (**self).train(x, y)
    }

    fn is_fitted(&self) -> bool {
        (**self).is_fitted()
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Prediction> {
        (**self).predict(x)
    }

    fn predict_marginalized(&self, x: &[Vec<f64>], contexts: &[Vec<f64>]) -> Result<Prediction> {
        (**self).predict_marginalized(x, contexts)
    }
}
