#![allow(
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

mod instances;
mod observers;
mod run;
mod stage;

use std::sync::Arc;

use intensify::encoder::Encoder;
use intensify::space::SearchSpace;
use intensify::stopping::{StoppingConfig, StoppingConfigBuilder, StoppingEngine};
use intensify::surrogate::{Prediction, SurrogateModel};
use intensify::{Configuration, ParamValue};

/// A model predicting mean 0.985 and standard deviation 0.015 everywhere.
///
/// With beta 1 the bounds are 0.97 and 1.0 for every candidate, so the
/// regret is 0.03.
#[derive(Debug, Default)]
pub struct FixedModel {
    pub fits: usize,
}

pub const REGRET: f64 = 0.03;

impl SurrogateModel for FixedModel {
    fn train(&mut self, x: &[Vec<f64>], _y: &[f64]) -> intensify::Result<()> {
        if x.is_empty() {
            return Err(intensify::Error::EmptyDataset);
        }
        self.fits += 1;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.fits > 0
    }

    fn predict(&self, x: &[Vec<f64>]) -> intensify::Result<Prediction> {
        if self.fits == 0 {
            return Err(intensify::Error::NotFitted);
        }
        Ok(Prediction {
            mean: vec![0.985; x.len()],
            variance: vec![0.000_225; x.len()],
        })
    }
}

pub fn space() -> Arc<SearchSpace> {
    Arc::new(
        SearchSpace::builder()
            .float("x", 0.0, 1.0)
            .int("depth", 1, 4)
            .build()
            .unwrap(),
    )
}

pub fn config(x: f64, depth: i64) -> Configuration {
    Configuration::new()
        .with("x", ParamValue::Float(x))
        .with("depth", ParamValue::Int(depth))
}

/// Fixed beta 1 for both the stage and run bounds.
pub fn settings() -> StoppingConfigBuilder {
    StoppingConfig::builder()
        .beta(1.0)
        .update_beta(false)
        .run_beta(1.0)
        .n_points_lcb(20)
        .seed(7)
}

pub fn engine(config: StoppingConfig) -> StoppingEngine<FixedModel> {
    StoppingEngine::new(FixedModel::default(), Encoder::new(space()), config)
}
