//! The [`Dispatcher`] trait defines how a trial is evaluated.
//!
//! The racing core never runs the target algorithm itself. It hands each
//! scheduled trial to a dispatcher and records whatever comes back. For
//! simple targets a closure is enough:
//!
//! ```
//! use intensify::dispatch::Dispatcher;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let target = |config: &Configuration, key: &TrialKey| {
//!     let Some(ParamValue::Float(x)) = config.get("x") else {
//!         return Err("x is missing");
//!     };
//!     let budget = key.budget.map_or(1.0, |b| b.value());
//!     Ok(TrialRecord::success(x * x + 1.0 / budget))
//! };
//!
//! let config = Configuration::new().with("x", ParamValue::Float(0.5));
//! # let key = TrialKey::new(intensify::storage::ConfigId::new(0)).budget(4.0);
//! let record = target.evaluate(&config, &key).unwrap();
//! assert_eq!(record.cost, Some(0.5));
//! ```
//!
//! Implement the trait on a struct for the hooks: halting the race from
//! [`after_trial`](Dispatcher::after_trial) or retrying failed evaluations
//! with [`max_retries`](Dispatcher::max_retries).
//!
//! ```
//! use std::ops::ControlFlow;
//!
//! use intensify::dispatch::Dispatcher;
//! use intensify::{Configuration, TrialKey, TrialRecord};
//!
//! struct Flaky;
//!
//! impl Dispatcher for Flaky {
//!     type Error = String;
//!
//!     fn evaluate(&self, _config: &Configuration, key: &TrialKey) -> Result<TrialRecord, String> {
//!         match key.seed {
//!             Some(0) => Err("cluster node lost".into()),
//!             _ => Ok(TrialRecord::success(1.0)),
//!         }
//!     }
//!
//!     fn after_trial(&self, _key: &TrialKey, record: &TrialRecord) -> ControlFlow<()> {
//!         if record.cost.is_some_and(|c| c < 0.01) {
//!             ControlFlow::Break(())
//!         } else {
//!             ControlFlow::Continue(())
//!         }
//!     }
//!
//!     fn max_retries(&self) -> usize {
//!         2
//!     }
//! }
//! # let _ = Flaky;
//! ```

use core::ops::ControlFlow;

use crate::param::Configuration;
use crate::trial::{TrialKey, TrialRecord};

/// Evaluates one configuration under one trial key.
///
/// The only required method is [`evaluate`](Dispatcher::evaluate). The key
/// carries the budget, and the seed and instance when the scenario uses
/// them.
///
/// # When to use `Dispatcher` vs a closure
///
/// - **Closure** `Fn(&Configuration, &TrialKey) -> Result<TrialRecord, E>`
///   for evaluate-only targets.
/// - **`Dispatcher` struct** when you need [`after_trial`](Dispatcher::after_trial)
///   or retries.
pub trait Dispatcher {
    /// The error type returned by [`evaluate`](Dispatcher::evaluate).
    type Error: ToString + 'static;

    /// Runs the target algorithm for `config` at `key`.
    ///
    /// Return a [`TrialRecord`] carrying the cost and any statistics the
    /// stopping policies read (for example `"statistical_error"`).
    ///
    /// # Errors
    ///
    /// Any error whose type implements `ToString`. Once retries are used up
    /// it is recorded as a failed trial carrying the message.
    fn evaluate(&self, config: &Configuration, key: &TrialKey) -> Result<TrialRecord, Self::Error>;

    /// Called after every recorded trial, successful or not.
    ///
    /// Return `ControlFlow::Break(())` to halt the race.
    ///
    /// Default: always continues.
    fn after_trial(&self, _key: &TrialKey, _record: &TrialRecord) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Maximum number of retries for a failed evaluation.
    ///
    /// Default: `0`.
    fn max_retries(&self) -> usize {
        0
    }
}

impl<F, E> Dispatcher for F
where
    F: Fn(&Configuration, &TrialKey) -> Result<TrialRecord, E>,
    E: ToString + 'static,
{
    type Error = E;

    fn evaluate(&self, config: &Configuration, key: &TrialKey) -> Result<TrialRecord, E> {
        self(config, key)
    }
}

/// Runs `dispatcher` with its retry policy. Errors that outlive the
/// retries become failure records.
pub(crate) fn evaluate_with_retries<D: Dispatcher + ?Sized>(
    dispatcher: &D,
    config: &Configuration,
    key: &TrialKey,
) -> TrialRecord {
    let mut attempt = 0;
    loop {
        match dispatcher.evaluate(config, key) {
            Ok(record) => return record,
            Err(_e) if attempt < dispatcher.max_retries() => {
                attempt += 1;
                trace_debug!(key = %key, attempt, error = %_e.to_string(), "retrying trial");
            }
            Err(e) => return TrialRecord::failure(e.to_string()),
        }
    }
}
