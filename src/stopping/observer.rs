use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::storage::ConfigId;
use crate::types::Budget;

/// Error type observers may return. It is logged and otherwise ignored.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// What a decision was about.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StopScope {
    /// A per-stage decision.
    Stage {
        /// The stage id.
        id: usize,
        /// The stage budget.
        budget: Budget,
    },
    /// A whole-run decision for the given incumbent.
    Run {
        /// The incumbent the statistical error was computed for.
        incumbent: ConfigId,
    },
}

/// Diagnostics of one stopping decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopEvent {
    /// Stage or run.
    pub scope: StopScope,
    /// Smallest lower confidence bound over the pool, in cost units.
    pub min_lcb: f64,
    /// Smallest upper confidence bound over the pool, in cost units.
    pub min_ucb: f64,
    /// The statistical error the regret was compared against.
    pub statistical_error: f64,
    /// `min_ucb - min_lcb`, clamped at zero.
    pub regret: f64,
    /// The effective confidence coefficient.
    pub beta: f64,
    /// Whether the decision was to stop.
    pub triggered: bool,
}

/// Receives a [`StopEvent`] after every decision.
///
/// Observers are informational: errors they return and panics they raise
/// are logged and never change the decision.
///
/// Closures `Fn(&StopEvent) -> Result<(), ObserverError>` are observers.
pub trait Observer: Send + Sync {
    /// Records one decision.
    ///
    /// # Errors
    ///
    /// Any error; it is logged and dropped.
    fn log(&self, event: &StopEvent) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&StopEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn log(&self, event: &StopEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// An observer that keeps every event in memory.
///
/// Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<StopEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<StopEvent> {
        self.events.lock().clone()
    }

    /// Returns the most recent event.
    #[must_use]
    pub fn last(&self) -> Option<StopEvent> {
        self.events.lock().last().copied()
    }
}

impl Observer for EventLog {
    fn log(&self, event: &StopEvent) -> Result<(), ObserverError> {
        self.events.lock().push(*event);
        Ok(())
    }
}

/// Delivers `event` to every observer, isolating their failures.
pub(super) fn notify(observers: &[Box<dyn Observer>], event: &StopEvent) {
    for observer in observers {
        match catch_unwind(AssertUnwindSafe(|| observer.log(event))) {
            Ok(Ok(())) => {}
            Ok(Err(_e)) => {
                trace_warn!(error = %_e, "stop observer failed");
            }
            Err(_) => {
                trace_warn!("stop observer panicked");
            }
        }
    }
}
