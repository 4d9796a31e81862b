#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

#[cfg(feature = "gp")]
mod gp;
mod ladder;
#[cfg(feature = "journal")]
mod resume;
mod run_level;

use std::sync::Arc;

use intensify::encoder::Encoder;
use intensify::space::SearchSpace;
use intensify::stopping::{StoppingConfig, StoppingConfigBuilder, StoppingEngine};
use intensify::surrogate::{Prediction, SurrogateModel};
use intensify::{Budget, Configuration, ParamValue, TrialKey, TrialRecord};

/// Bounds 0.97 and 1.0 everywhere with beta 1, so the regret is 0.03.
#[derive(Debug, Default)]
pub struct FixedModel {
    fitted: bool,
}

impl SurrogateModel for FixedModel {
    fn train(&mut self, x: &[Vec<f64>], _y: &[f64]) -> intensify::Result<()> {
        if x.is_empty() {
            return Err(intensify::Error::EmptyDataset);
        }
        self.fitted = true;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn predict(&self, x: &[Vec<f64>]) -> intensify::Result<Prediction> {
        Ok(Prediction {
            mean: vec![0.985; x.len()],
            variance: vec![0.000_225; x.len()],
        })
    }
}

pub fn space() -> Arc<SearchSpace> {
    Arc::new(SearchSpace::builder().float("x", -2.0, 2.0).build().unwrap())
}

/// `n` evenly spaced points in `[-2, 2]`.
pub fn design(n: usize) -> Vec<Configuration> {
    (0..n)
        .map(|i| {
            let x = -2.0 + 4.0 * i as f64 / (n - 1).max(1) as f64;
            Configuration::new().with("x", ParamValue::Float(x))
        })
        .collect()
}

pub fn x_of(config: &Configuration) -> f64 {
    config.get("x").map_or(f64::NAN, ParamValue::as_f64)
}

/// A shifted sphere whose low-budget estimates are biased upwards.
pub fn sphere(config: &Configuration, key: &TrialKey) -> Result<TrialRecord, String> {
    let budget = key.budget.map_or(1.0, Budget::value);
    let x = x_of(config);
    Ok(TrialRecord::success((x - 0.5).powi(2) + 1.0 / budget)
        .with_statistic("statistical_error", 0.0))
}

pub fn settings() -> StoppingConfigBuilder {
    StoppingConfig::builder()
        .beta(1.0)
        .update_beta(false)
        .run_beta(1.0)
        .n_points_lcb(10)
        .seed(13)
}

pub fn fixed_engine(config: StoppingConfig) -> StoppingEngine<FixedModel> {
    StoppingEngine::new(FixedModel::default(), Encoder::new(space()), config)
}
