#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Multi-fidelity racing with statistically grounded early stopping.
//!
//! Configurations are raced along a ladder of increasing budgets (data
//! fractions, epochs, walltime). At each rung every alive configuration is
//! evaluated, and the best `1/eta` move on. Before promoting, a stopping
//! engine fits a surrogate model and compares the regret it still admits
//! against the statistical error of the empirical costs: when noise alone
//! could explain the remaining gap, the race stops early.
//!
//! # Getting Started
//!
//! ```
//! # #[cfg(feature = "gp")]
//! # fn main() -> intensify::Result<()> {
//! use std::sync::Arc;
//!
//! use intensify::prelude::*;
//!
//! let space = Arc::new(SearchSpace::builder().float("x", -2.0, 2.0).build()?);
//! let engine = StoppingEngine::new(
//!     GaussianProcess::new(),
//!     Encoder::new(space),
//!     StoppingConfig::builder().seed(42).build(),
//! );
//! let stages = StageManager::builder().min_budget(1.0).max_budget(9.0).build();
//! let mut racer = Intensifier::new(TrialStore::new(), stages, engine);
//!
//! let design = (0..9).map(|i| {
//!     Configuration::new().with("x", ParamValue::Float(f64::from(i) / 2.0 - 2.0))
//! });
//! let report = racer.race(design, &|config: &Configuration, key: &TrialKey| {
//!     let x = config.get("x").map_or(0.0, ParamValue::as_f64);
//!     let budget = key.budget.map_or(1.0, Budget::value);
//!     // Lower budgets give noisier estimates
//!     let noise = 0.05 / budget;
//!     let record = TrialRecord::success((x - 0.5).powi(2) + noise)
//!         .with_statistic("statistical_error", noise);
//!     Ok::<_, Error>(record)
//! })?;
//!
//! let best = report.incumbent.unwrap();
//! println!("best {} at cost {:.4} ({:?})", best.config_id, best.cost, report.stop_reason);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "gp"))]
//! # fn main() {}
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`TrialStore`](storage::TrialStore) | The ledger: configurations, trial keys and their records, with an incumbent. |
//! | [`Encoder`](encoder::Encoder) | Turn configurations and ledger contents into numeric model inputs. |
//! | [`SurrogateModel`](surrogate::SurrogateModel) | Predictive mean and variance over encoded configurations. |
//! | [`ConfidenceBound`](acquisition::ConfidenceBound) | Lower and upper confidence bounds with a data-dependent coefficient. |
//! | [`StageManager`](stage::StageManager) | The budget ladder and the stage state machine. |
//! | [`StoppingEngine`](stopping::StoppingEngine) | Regret-versus-error stopping decisions per stage and per run. |
//! | [`Intensifier`](intensifier::Intensifier) | The racing loop over a [`Dispatcher`](dispatch::Dispatcher). |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `gp` | [`GaussianProcess`](surrogate::GaussianProcess) surrogate (nalgebra) | on |
//! | `async` | [`SharedStoppingEngine`](stopping::SharedStoppingEngine), decisions offloaded via tokio | off |
//! | `serde` | `Serialize`/`Deserialize` on records, keys and configurations | off |
//! | `journal` | `JournalStorage`: JSONL persistence with file locking (enables `serde`) | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at decision points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod dispatch;
pub mod encoder;
mod error;
pub mod intensifier;
mod param;
pub mod space;
pub mod stage;
pub mod stopping;
pub mod storage;
pub mod surrogate;
mod trial;
mod types;

pub use error::{Error, Result};
pub use param::{Configuration, ParamValue};
pub use trial::{AttrValue, TrialKey, TrialRecord};
pub use types::{Aggregation, Budget, TrialStatus};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use intensify::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{BoundKind, ConfidenceBound, LowerBoundPolicy, Marginalization};
    pub use crate::dispatch::Dispatcher;
    pub use crate::encoder::{CategoricalEncoding, Encoder, ResponseTransform};
    pub use crate::error::{Error, Result};
    pub use crate::intensifier::{Intensifier, RaceReport, StopReason};
    pub use crate::param::{Configuration, ParamValue};
    pub use crate::space::{ConfigurationSpace, SearchSpace};
    pub use crate::stage::{Stage, StageManager, StageState};
    #[cfg(feature = "async")]
    pub use crate::stopping::SharedStoppingEngine;
    pub use crate::stopping::{EventLog, Observer, StopEvent, StoppingConfig, StoppingEngine};
    #[cfg(feature = "journal")]
    pub use crate::storage::JournalStorage;
    pub use crate::storage::{ConfigId, MemoryStorage, Storage, TrialHistory, TrialStore};
    #[cfg(feature = "gp")]
    pub use crate::surrogate::GaussianProcess;
    pub use crate::surrogate::{Prediction, SurrogateModel};
    pub use crate::trial::{AttrValue, TrialKey, TrialRecord};
    pub use crate::types::{Aggregation, Budget, TrialStatus};
}
