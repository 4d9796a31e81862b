use crate::storage::ConfigId;
use crate::trial::TrialKey;

/// Errors produced by the ledger, the encoder, the surrogate seam and the
/// stopping machinery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a trial key is added to the ledger a second time.
    #[error("duplicate trial key: {0}")]
    DuplicateKey(TrialKey),

    /// Returned when a trial key or configuration is not in the ledger.
    ///
    /// Recoverable: callers treat it as "no data yet".
    #[error("not found: {0}")]
    NotFound(String),

    /// Returned when a model would be fitted on zero rows.
    #[error("cannot fit a surrogate model on an empty dataset")]
    EmptyDataset,

    /// Returned when the minimum upper bound of a pool is below its
    /// minimum lower bound.
    ///
    /// Decisions never propagate this; the regret is clamped to zero
    /// and a warning is emitted instead.
    #[error("inconsistent bounds: min_ucb ({min_ucb}) is below min_lcb ({min_lcb})")]
    InconsistentBound {
        /// The minimum lower confidence bound over the pool.
        min_lcb: f64,
        /// The minimum upper confidence bound over the pool.
        min_ucb: f64,
    },

    /// Returned when a trial lacks the auxiliary statistic a stopping
    /// policy needs and no fallback threshold is configured.
    #[error("trial for {config} has no statistic named '{name}'")]
    MissingStatistic {
        /// The configuration whose record lacks the field.
        config: ConfigId,
        /// The name of the missing statistic.
        name: String,
    },

    /// Returned when predictions are requested before the model was trained.
    #[error("surrogate model has not been fitted")]
    NotFitted,

    /// Returned when fitting the surrogate model fails numerically.
    #[error("surrogate model fit failed: {0}")]
    ModelFit(String),

    /// Returned when the lower bound is greater than the upper bound.
    #[error("invalid bounds: low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when log scale is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for log scale")]
    InvalidLogBounds,

    /// Returned when categorical choices or ordinal levels are empty.
    #[error("parameter '{0}' must declare at least one choice")]
    EmptyChoices(String),

    /// Returned when two parameters share the same name.
    #[error("parameter '{0}' is declared twice")]
    DuplicateParameter(String),

    /// Returned when a configuration lacks a value the space declares.
    #[error("configuration has no value for parameter '{0}'")]
    MissingParameter(String),

    /// Returned when a fraction or rate lies outside `(0.0, 1.0]`.
    #[error("invalid rate: {0} must be in (0.0, 1.0]")]
    InvalidRate(f64),

    /// Returned when a stage would promote more configurations than it holds.
    #[error("invalid stage: {survivors} survivors requested from {alive} alive configurations")]
    InvalidStage {
        /// The requested survivor count.
        survivors: usize,
        /// The number of alive configurations.
        alive: usize,
    },

    /// Returned when a stage is driven through a transition its state does not allow.
    #[error("invalid stage transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The current state.
        from: crate::stage::StageState,
        /// The requested state.
        to: crate::stage::StageState,
    },

    /// Returned when an encoded row has the wrong number of columns.
    #[error("dimension mismatch: expected {expected} columns, got {got}")]
    DimensionMismatch {
        /// The expected number of columns.
        expected: usize,
        /// The actual number of columns.
        got: usize,
    },

    /// Returned when an offloaded decision task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),

    /// Returned when a storage operation fails.
    #[cfg(feature = "journal")]
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = core::result::Result<T, Error>;
