use crate::acquisition::{LowerBoundPolicy, Marginalization};

/// Default base coefficient of the stage-level bounds.
const DEFAULT_BETA: f64 = 0.1;
/// Default base coefficient of the run-level bounds.
const DEFAULT_RUN_BETA: f64 = 0.2;
/// Default fraction of the configurations at a budget used for the upper bound.
const DEFAULT_UPPER_BOUND_RATE: f64 = 0.5;
/// Default number of random configurations added to the lower-bound pool.
const DEFAULT_N_POINTS_LCB: usize = 1000;
/// Default tolerance of the stage-level stop rule.
const DEFAULT_STAGE_EPSILON: f64 = 1e-4;

/// Settings of a [`StoppingEngine`](super::StoppingEngine).
///
/// | Option | Default | Description |
/// |--------|---------|-------------|
/// | `beta` | 0.1 | Base coefficient of the stage-level bounds |
/// | `update_beta` | `true` | Grow the stage coefficient with the data |
/// | `srinivas_scaling` | `true` | Apply the `π²/6` scaling when growing |
/// | `run_beta` | 0.2 | Fixed coefficient of the run-level bounds |
/// | `upper_bound_estimation_rate` | 0.5 | Best fraction of configurations in the per-stage pool |
/// | `run_upper_bound_estimation_rate` | 1.0 | Best fraction in the run-level pool |
/// | `n_points_lcb` | 1000 | Random configurations added to the lower-bound pool |
/// | `statistic_name` | `"statistical_error"` | Per-trial noise field for stage decisions |
/// | `fallback_threshold` | none | Error used when an annotation is missing |
/// | `only_incumbent` | `true` | Estimate the stage error from the best configuration only |
/// | `config_estimation_percentage` | 1.0 | Fraction of survivor slots otherwise |
/// | `stage_epsilon` | 1e-4 | Near-tie tolerance of the stage rule |
/// | `run_epsilon` | 0.0 | Near-tie tolerance of the run rule |
/// | `lower_bound` | `Derived` | How the lower end of the regret is obtained |
/// | `marginalization` | `None` | Whether predictions average out instance contexts; follows the encoder layout |
/// | `min_trials` | 1 | Encoded rows required before a model is fitted |
/// | `std_field`, `folds_field`, `data_points_field` | `"std_crossval"`, `"folds"`, `"data_points"` | Run-level annotations |
/// | `seed` | random | Seed of the lower-bound sampler |
#[derive(Clone, Debug)]
pub struct StoppingConfig {
    pub(crate) beta: f64,
    pub(crate) update_beta: bool,
    pub(crate) srinivas_scaling: bool,
    pub(crate) run_beta: f64,
    pub(crate) upper_bound_estimation_rate: f64,
    pub(crate) run_upper_bound_estimation_rate: f64,
    pub(crate) n_points_lcb: usize,
    pub(crate) statistic_name: Option<String>,
    pub(crate) fallback_threshold: Option<f64>,
    pub(crate) only_incumbent: bool,
    pub(crate) config_estimation_percentage: f64,
    pub(crate) stage_epsilon: f64,
    pub(crate) run_epsilon: f64,
    pub(crate) lower_bound: LowerBoundPolicy,
    pub(crate) marginalization: Marginalization,
    pub(crate) min_trials: usize,
    pub(crate) std_field: String,
    pub(crate) folds_field: String,
    pub(crate) data_points_field: String,
    pub(crate) seed: Option<u64>,
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            beta: DEFAULT_BETA,
            update_beta: true,
            srinivas_scaling: true,
            run_beta: DEFAULT_RUN_BETA,
            upper_bound_estimation_rate: DEFAULT_UPPER_BOUND_RATE,
            run_upper_bound_estimation_rate: 1.0,
            n_points_lcb: DEFAULT_N_POINTS_LCB,
            statistic_name: Some("statistical_error".to_owned()),
            fallback_threshold: None,
            only_incumbent: true,
            config_estimation_percentage: 1.0,
            stage_epsilon: DEFAULT_STAGE_EPSILON,
            run_epsilon: 0.0,
            lower_bound: LowerBoundPolicy::Derived,
            marginalization: Marginalization::None,
            min_trials: 1,
            std_field: "std_crossval".to_owned(),
            folds_field: "folds".to_owned(),
            data_points_field: "data_points".to_owned(),
            seed: None,
        }
    }
}

impl StoppingConfig {
    /// Returns a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> StoppingConfigBuilder {
        StoppingConfigBuilder {
            config: Self::default(),
        }
    }

    /// Tolerance of the stage-level stop rule.
    #[must_use]
    pub fn stage_epsilon(&self) -> f64 {
        self.stage_epsilon
    }

    /// Tolerance of the run-level stop rule.
    #[must_use]
    pub fn run_epsilon(&self) -> f64 {
        self.run_epsilon
    }

    /// The lower-bound policy.
    #[must_use]
    pub fn lower_bound(&self) -> LowerBoundPolicy {
        self.lower_bound
    }

    /// The marginalization mode.
    #[must_use]
    pub fn marginalization(&self) -> Marginalization {
        self.marginalization
    }
}

/// Builder for a [`StoppingConfig`].
#[derive(Clone, Debug)]
pub struct StoppingConfigBuilder {
    config: StoppingConfig,
}

fn assert_rate(name: &str, rate: f64) {
    assert!(
        rate > 0.0 && rate <= 1.0,
        "{name} must be in (0.0, 1.0], got {rate}"
    );
}

impl StoppingConfigBuilder {
    /// Sets the base coefficient of the stage-level bounds.
    ///
    /// # Panics
    ///
    /// Panics if `beta` is not positive.
    #[must_use]
    pub fn beta(mut self, beta: f64) -> Self {
        assert!(beta > 0.0, "beta must be positive, got {beta}");
        self.config.beta = beta;
        self
    }

    /// Enables or disables growth of the stage coefficient with the data.
    #[must_use]
    pub fn update_beta(mut self, enabled: bool) -> Self {
        self.config.update_beta = enabled;
        self
    }

    /// Enables or disables the `π²/6` scaling of the grown coefficient.
    #[must_use]
    pub fn srinivas_scaling(mut self, enabled: bool) -> Self {
        self.config.srinivas_scaling = enabled;
        self
    }

    /// Sets the fixed coefficient of the run-level bounds.
    ///
    /// # Panics
    ///
    /// Panics if `beta` is not positive.
    #[must_use]
    pub fn run_beta(mut self, beta: f64) -> Self {
        assert!(beta > 0.0, "run_beta must be positive, got {beta}");
        self.config.run_beta = beta;
        self
    }

    /// Sets the best fraction of configurations in the per-stage pool.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < rate <= 1`.
    #[must_use]
    pub fn upper_bound_estimation_rate(mut self, rate: f64) -> Self {
        assert_rate("upper_bound_estimation_rate", rate);
        self.config.upper_bound_estimation_rate = rate;
        self
    }

    /// Sets the best fraction of configurations in the run-level pool.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < rate <= 1`.
    #[must_use]
    pub fn run_upper_bound_estimation_rate(mut self, rate: f64) -> Self {
        assert_rate("run_upper_bound_estimation_rate", rate);
        self.config.run_upper_bound_estimation_rate = rate;
        self
    }

    /// Sets how many random configurations join the lower-bound pool.
    #[must_use]
    pub fn n_points_lcb(mut self, n: usize) -> Self {
        self.config.n_points_lcb = n;
        self
    }

    /// Sets the per-trial noise field; `None` always uses the fallback threshold.
    #[must_use]
    pub fn statistic_name(mut self, name: Option<&str>) -> Self {
        self.config.statistic_name = name.map(str::to_owned);
        self
    }

    /// Sets the error used when a trial lacks its noise annotation.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is negative.
    #[must_use]
    pub fn fallback_threshold(mut self, threshold: f64) -> Self {
        assert!(threshold >= 0.0, "fallback_threshold must be >= 0, got {threshold}");
        self.config.fallback_threshold = Some(threshold);
        self
    }

    /// Estimates the stage error from the best configuration only.
    #[must_use]
    pub fn only_incumbent(mut self, enabled: bool) -> Self {
        self.config.only_incumbent = enabled;
        self
    }

    /// Sets the fraction of survivor slots whose errors are averaged when
    /// not using the incumbent only.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < pct <= 1`.
    #[must_use]
    pub fn config_estimation_percentage(mut self, pct: f64) -> Self {
        assert_rate("config_estimation_percentage", pct);
        self.config.config_estimation_percentage = pct;
        self
    }

    /// Sets the near-tie tolerance of the stage rule.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is negative.
    #[must_use]
    pub fn stage_epsilon(mut self, epsilon: f64) -> Self {
        assert!(epsilon >= 0.0, "stage_epsilon must be >= 0, got {epsilon}");
        self.config.stage_epsilon = epsilon;
        self
    }

    /// Sets the near-tie tolerance of the run rule.
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is negative.
    #[must_use]
    pub fn run_epsilon(mut self, epsilon: f64) -> Self {
        assert!(epsilon >= 0.0, "run_epsilon must be >= 0, got {epsilon}");
        self.config.run_epsilon = epsilon;
        self
    }

    /// Sets the lower-bound policy.
    #[must_use]
    pub fn lower_bound(mut self, policy: LowerBoundPolicy) -> Self {
        self.config.lower_bound = policy;
        self
    }

    /// Sets the marginalization mode.
    ///
    /// [`StoppingEngine::new`](super::StoppingEngine::new) replaces it with the
    /// mode implied by the encoder's instance context column.
    #[must_use]
    pub fn marginalization(mut self, marginalization: Marginalization) -> Self {
        self.config.marginalization = marginalization;
        self
    }

    /// Sets the number of encoded rows required before a model is fitted.
    #[must_use]
    pub fn min_trials(mut self, n: usize) -> Self {
        self.config.min_trials = n;
        self
    }

    /// Renames the run-level annotations.
    #[must_use]
    pub fn crossval_fields(
        mut self,
        std: impl Into<String>,
        folds: impl Into<String>,
        data_points: impl Into<String>,
    ) -> Self {
        self.config.std_field = std.into();
        self.config.folds_field = folds.into();
        self.config.data_points_field = data_points.into();
        self
    }

    /// Seeds the lower-bound sampler.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Builds the configuration.
    ///
    /// # Panics
    ///
    /// Panics if neither a statistic name nor a fallback threshold is set.
    #[must_use]
    pub fn build(self) -> StoppingConfig {
        assert!(
            self.config.statistic_name.is_some() || self.config.fallback_threshold.is_some(),
            "a statistic name or a fallback threshold is required"
        );
        self.config
    }
}
