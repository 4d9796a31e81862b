//! Gaussian process regression with a Matérn 5/2 kernel.
//!
//! Targets are standardized before fitting and predictions are mapped back
//! to the original scale. ARD lengthscales are set to the per-dimension
//! standard deviation of the training inputs, and the kernel matrix is
//! factorized with a Cholesky decomposition. At most
//! [`max_train_points`](GaussianProcessBuilder::max_train_points) of the
//! most recent observations are used to keep the O(n³) fit bounded.
//!
//! # Examples
//!
//! ```
//! use intensify::surrogate::{GaussianProcess, SurrogateModel};
//!
//! let mut gp = GaussianProcess::builder().noise_variance(1e-4).build();
//! let x = vec![vec![0.0], vec![0.5], vec![1.0]];
//! gp.train(&x, &[1.0, 0.0, 1.0]).unwrap();
//!
//! let p = gp.predict(&[vec![0.5]]).unwrap();
//! assert!(p.mean[0].abs() < 0.1);
//! ```

use nalgebra::{DMatrix, DVector};

use super::{Prediction, SurrogateModel};
use crate::error::{Error, Result};

/// Default observation noise variance.
const DEFAULT_NOISE_VAR: f64 = 1e-6;
/// Default cap on training points.
const DEFAULT_MAX_TRAIN_POINTS: usize = 100;
/// Precomputed √5 constant.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Gaussian process surrogate.
pub struct GaussianProcess {
    noise_variance: f64,
    max_train_points: usize,
    fit: Option<GpFit>,
}

impl GaussianProcess {
    /// Creates an unfitted process with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a `GaussianProcess`.
    #[must_use]
    pub fn builder() -> GaussianProcessBuilder {
        GaussianProcessBuilder::default()
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`GaussianProcess`].
///
/// - `noise_variance`: 1e-6
/// - `max_train_points`: 100
#[derive(Debug, Clone, Default)]
pub struct GaussianProcessBuilder {
    noise_variance: Option<f64>,
    max_train_points: Option<usize>,
}

impl GaussianProcessBuilder {
    /// Sets the observation noise variance added to the kernel diagonal.
    ///
    /// Larger values make the process smoother and the factorization more
    /// stable on repeated observations.
    ///
    /// # Panics
    ///
    /// Panics if `v` is negative.
    #[must_use]
    pub fn noise_variance(mut self, v: f64) -> Self {
        assert!(v >= 0.0, "noise_variance must be non-negative, got {v}");
        self.noise_variance = Some(v);
        self
    }

    /// Caps the number of (most recent) observations used for fitting.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[must_use]
    pub fn max_train_points(mut self, n: usize) -> Self {
        assert!(n > 0, "max_train_points must be positive");
        self.max_train_points = Some(n);
        self
    }

    /// Builds the configured [`GaussianProcess`].
    #[must_use]
    pub fn build(self) -> GaussianProcess {
        GaussianProcess {
            noise_variance: self.noise_variance.unwrap_or(DEFAULT_NOISE_VAR),
            max_train_points: self.max_train_points.unwrap_or(DEFAULT_MAX_TRAIN_POINTS),
            fit: None,
        }
    }
}

/// A fitted process ready for predictions.
struct GpFit {
    /// Cholesky factor L of K + σ²I.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// α = (K + σ²I)^{-1} y.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    signal_var: f64,
    y_mean: f64,
    y_std: f64,
}

impl SurrogateModel for GaussianProcess {
    #[allow(clippy::cast_precision_loss)]
    fn train(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if y.is_empty() {
            return Err(Error::EmptyDataset);
        }
        if x.len() != y.len() {
            return Err(Error::DimensionMismatch {
                expected: y.len(),
                got: x.len(),
            });
        }
        let d = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != d) {
            return Err(Error::DimensionMismatch {
                expected: d,
                got: row.len(),
            });
        }

        let start = y.len().saturating_sub(self.max_train_points);
        let x_train = &x[start..];
        let y_train = &y[start..];
        let n = y_train.len();

        // Standardize y
        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y_train.iter().map(|&v| (v - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y_standardized: Vec<f64> = y_train.iter().map(|&v| (v - y_mean) / y_std).collect();

        let lengthscales: Vec<f64> = (0..d)
            .map(|j| {
                let mean_j = x_train.iter().map(|r| r[j]).sum::<f64>() / n as f64;
                let var_j = x_train
                    .iter()
                    .map(|r| (r[j] - mean_j).powi(2))
                    .sum::<f64>()
                    / n as f64;
                var_j.sqrt().max(0.01)
            })
            .collect();

        // Signal variance = 1.0 (data is standardized)
        let signal_var = 1.0;

        let k = kernel_matrix(x_train, &lengthscales, signal_var, self.noise_variance);
        let cholesky = nalgebra::linalg::Cholesky::new(k).ok_or_else(|| {
            Error::ModelFit("kernel matrix is not positive definite".to_owned())
        })?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y_standardized));

        trace_debug!(n_points = n, dims = d, "fitted gaussian process");
        self.fit = Some(GpFit {
            cholesky,
            alpha,
            x_train: x_train.to_vec(),
            lengthscales,
            signal_var,
            y_mean,
            y_std,
        });
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Prediction> {
        let fit = self.fit.as_ref().ok_or(Error::NotFitted)?;
        let d = fit.lengthscales.len();
        let mut out = Prediction {
            mean: Vec::with_capacity(x.len()),
            variance: Vec::with_capacity(x.len()),
        };
        for row in x {
            if row.len() != d {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    got: row.len(),
                });
            }
            let (mean, var) = fit.predict(row);
            out.mean.push(mean * fit.y_std + fit.y_mean);
            out.variance.push(var * fit.y_std * fit.y_std);
        }
        Ok(out)
    }
}

impl GpFit {
    /// Mean and variance in standardized units.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales, self.signal_var)
        });

        // Mean: k*^T α
        let mean = k_star.dot(&self.alpha);

        // Variance: k(x*, x*) - k*^T (K + σ²I)^{-1} k*
        let v = self.cholesky.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);

        (mean, var)
    }
}

/// Matérn 5/2 kernel with ARD lengthscales.
///
/// `k(x1, x2) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)`
/// where `r = sqrt(Σ ((x1_i - x2_i) / l_i)²)`
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64], signal_var: f64) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let r = r_sq.sqrt();
    let sqrt5_r = SQRT_5 * r;
    signal_var * (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

/// Build the kernel matrix `K + σ²I`.
fn kernel_matrix(
    x: &[Vec<f64>],
    lengthscales: &[f64],
    signal_var: f64,
    noise_var: f64,
) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = matern52(&x[i], &x[j], lengthscales, signal_var);
        if i == j { k + noise_var } else { k }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matern_is_one_at_zero_distance() {
        let k = matern52(&[0.3, 0.7], &[0.3, 0.7], &[1.0, 1.0], 1.0);
        assert!((k - 1.0).abs() < 1e-12);
        let far = matern52(&[0.0], &[10.0], &[1.0], 1.0);
        assert!(far < 1e-6);
    }

    #[test]
    fn interpolates_training_points() {
        let mut gp = GaussianProcess::new();
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![f64::from(i) / 7.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| (r[0] - 0.4).powi(2)).collect();
        gp.train(&x, &y).unwrap();
        let p = gp.predict(&x).unwrap();
        for (m, t) in p.mean.iter().zip(&y) {
            assert!((m - t).abs() < 1e-2, "{m} vs {t}");
        }
        assert!(p.variance.iter().all(|&v| (0.0..1e-3).contains(&v)));
    }

    #[test]
    fn uncertainty_grows_away_from_data() {
        let mut gp = GaussianProcess::new();
        gp.train(&[vec![0.0], vec![0.1]], &[1.0, 2.0]).unwrap();
        let p = gp.predict(&[vec![0.05], vec![5.0]]).unwrap();
        assert!(p.variance[1] > p.variance[0]);
    }

    #[test]
    fn rejects_bad_input() {
        let mut gp = GaussianProcess::new();
        assert!(matches!(gp.train(&[], &[]), Err(Error::EmptyDataset)));
        assert!(matches!(gp.predict(&[vec![0.0]]), Err(Error::NotFitted)));
        assert!(matches!(
            gp.train(&[vec![0.0], vec![0.0, 1.0]], &[1.0, 2.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        gp.train(&[vec![0.0, 1.0]], &[1.0]).unwrap();
        assert!(matches!(
            gp.predict(&[vec![0.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn keeps_only_recent_points() {
        let mut gp = GaussianProcess::builder().max_train_points(3).build();
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<f64> = (0..10).map(f64::from).collect();
        gp.train(&x, &y).unwrap();
        assert_eq!(gp.fit.as_ref().unwrap().x_train.len(), 3);
    }

    #[test]
    #[should_panic(expected = "noise_variance must be non-negative")]
    fn negative_noise_panics() {
        let _ = GaussianProcess::builder().noise_variance(-1.0);
    }
}
