use std::sync::Arc;

use parking_lot::Mutex;

use super::StoppingEngine;
use crate::error::{Error, Result};
use crate::stage::Stage;
use crate::storage::TrialHistory;
use crate::surrogate::SurrogateModel;

/// A [`StoppingEngine`] whose decisions run on tokio's blocking pool.
///
/// Model fitting and bound computation are CPU-bound, so each decision is
/// wrapped in [`spawn_blocking`](tokio::task::spawn_blocking) and awaited:
/// the async runtime stays responsive, and the caller still gets a
/// decision computed on a freshly fitted model. Clones share one engine;
/// concurrent decisions are serialized.
///
/// # Examples
///
/// ```
/// # #[cfg(all(feature = "async", feature = "gp"))]
/// # async fn example() -> intensify::Result<()> {
/// use std::sync::Arc;
///
/// use intensify::encoder::Encoder;
/// use intensify::space::SearchSpace;
/// use intensify::stopping::{SharedStoppingEngine, StoppingConfig, StoppingEngine};
/// use intensify::storage::TrialStore;
/// use intensify::surrogate::GaussianProcess;
///
/// let space = Arc::new(SearchSpace::builder().float("x", 0.0, 1.0).build()?);
/// let engine = StoppingEngine::new(
///     GaussianProcess::new(),
///     Encoder::new(space),
///     StoppingConfig::default(),
/// );
/// let shared = SharedStoppingEngine::new(engine);
///
/// let store = TrialStore::new();
/// assert!(!shared.should_run_stop(store.snapshot()).await?);
/// # Ok(())
/// # }
/// ```
pub struct SharedStoppingEngine<M> {
    inner: Arc<Mutex<StoppingEngine<M>>>,
}

impl<M> Clone for SharedStoppingEngine<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: SurrogateModel + 'static> SharedStoppingEngine<M> {
    /// Wraps `engine`.
    #[must_use]
    pub fn new(engine: StoppingEngine<M>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Offloads [`StoppingEngine::should_stage_stop`] and awaits it.
    ///
    /// # Errors
    ///
    /// Returns the decision's error, or [`Error::TaskError`] if the blocking
    /// task panicked.
    pub async fn should_stage_stop(&self, history: Arc<TrialHistory>, stage: Stage) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.lock().should_stage_stop(&history, &stage))
            .await
            .map_err(|e| Error::TaskError(e.to_string()))?
    }

    /// Offloads [`StoppingEngine::should_run_stop`] and awaits it.
    ///
    /// # Errors
    ///
    /// Returns the decision's error, or [`Error::TaskError`] if the blocking
    /// task panicked.
    pub async fn should_run_stop(&self, history: Arc<TrialHistory>) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.lock().should_run_stop(&history))
            .await
            .map_err(|e| Error::TaskError(e.to_string()))?
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut StoppingEngine<M>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
