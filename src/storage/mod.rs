//! The trial ledger and its storage backends.
//!
//! The [`Storage`] trait defines how trial results are recorded and read
//! back. [`TrialStore`] owns an `Arc<dyn Storage>` and is the handle the
//! racing engine works with.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryStorage`] | Copy-on-write [`TrialHistory`] behind a read-write lock (the default) | — |
//! | `JournalStorage` | JSONL file with `fs2` file locking, replayed on open | `journal` |
//!
//! # Consistency
//!
//! There is a single serialized writer: an append holds the write lock for
//! the duplicate check and the insert together, so two dispatch threads
//! racing to record the same key cannot both succeed. Readers call
//! [`snapshot`](Storage::snapshot), which only clones an `Arc`; every query
//! on the returned [`TrialHistory`] then runs without locks and observes
//! the ledger strictly before or strictly after any given append.
//!
//! ```
//! use intensify::storage::TrialStore;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let store = TrialStore::new();
//! let id = store.register(Configuration::new().with("x", ParamValue::Float(0.5)));
//!
//! store.add(TrialKey::new(id).seed(0).budget(10.0), TrialRecord::success(0.25)).unwrap();
//! assert!(store.add(TrialKey::new(id).seed(0).budget(10.0), TrialRecord::success(0.1)).is_err());
//!
//! assert_eq!(store.incumbent().unwrap().config_id, id);
//! ```

mod history;
#[cfg(feature = "journal")]
mod journal;
mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use history::KeyFilter;
pub use history::{ConfigId, Incumbent, TrialHistory};
#[cfg(feature = "journal")]
pub use journal::JournalStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use crate::param::Configuration;
use crate::trial::{TrialKey, TrialRecord};
use crate::types::{Aggregation, Budget};

/// Trait for recording and reading trial results.
///
/// Implementations must be `Send + Sync`: evaluations may be dispatched
/// from several threads while one coordinator records their results.
pub trait Storage: Send + Sync {
    /// Registers a configuration and returns its id. Registering a known
    /// configuration returns the id it already has.
    fn register(&self, config: Configuration) -> ConfigId;

    /// Appends a trial result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`](crate::Error::DuplicateKey) if the
    /// key was recorded before, or [`Error::NotFound`](crate::Error::NotFound)
    /// if its configuration was never registered.
    fn append(&self, key: TrialKey, record: TrialRecord) -> Result<()>;

    /// Returns an immutable view of the current ledger.
    fn snapshot(&self) -> Arc<TrialHistory>;

    /// Reload from an external source (e.g. a file written by another
    /// process). Return `true` if the in-memory ledger was updated.
    ///
    /// The default implementation is a no-op that returns `false`.
    fn refresh(&self) -> bool {
        false
    }
}

/// Handle over a [`Storage`] backend.
#[derive(Clone)]
pub struct TrialStore {
    storage: Arc<dyn Storage>,
}

impl core::fmt::Debug for TrialStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let snapshot = self.storage.snapshot();
        f.debug_struct("TrialStore")
            .field("n_configs", &snapshot.n_configs())
            .field("n_trials", &snapshot.len())
            .finish()
    }
}

impl Default for TrialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialStore {
    /// Creates an in-memory store aggregating repeated costs by their mean.
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    /// Creates an in-memory store with a custom aggregation.
    #[must_use]
    pub fn with_aggregation(aggregation: Aggregation) -> Self {
        Self::with_storage(MemoryStorage::with_aggregation(aggregation))
    }

    /// Wraps a custom backend.
    pub fn with_storage(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Registers `config`; see [`Storage::register`].
    pub fn register(&self, config: Configuration) -> ConfigId {
        self.storage.register(config)
    }

    /// Registers each configuration of an initial design, dropping later
    /// duplicates. Returns the ids in first-occurrence order.
    pub fn register_all(&self, configs: impl IntoIterator<Item = Configuration>) -> Vec<ConfigId> {
        let mut seen = HashSet::new();
        configs
            .into_iter()
            .map(|config| self.storage.register(config))
            .filter(|&id| seen.insert(id))
            .collect()
    }

    /// Adds a trial result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`](crate::Error::DuplicateKey) when the
    /// key already exists; the stored record is never overwritten.
    pub fn add(&self, key: TrialKey, record: TrialRecord) -> Result<()> {
        trace_debug!(key = %key, status = ?record.status, "recording trial");
        self.storage.append(key, record)
    }

    /// Returns a clone of the record stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) if the key is absent.
    pub fn get(&self, key: &TrialKey) -> Result<TrialRecord> {
        self.storage.snapshot().get(key).cloned()
    }

    /// Lazily iterates over the keys of `config_id`'s trials on a snapshot
    /// taken now. See [`TrialHistory::trials_for`].
    #[must_use]
    pub fn trials_for(
        &self,
        config_id: ConfigId,
        budget: Option<Budget>,
        highest_budget_only: bool,
    ) -> TrialKeys {
        let history = self.storage.snapshot();
        let filter = KeyFilter::new(&history, config_id, budget, highest_budget_only);
        let positions = history.positions(config_id).to_vec();
        TrialKeys {
            history,
            positions: positions.into_iter(),
            filter,
        }
    }

    /// The tracked incumbent; see [`TrialHistory::incumbent`].
    #[must_use]
    pub fn incumbent(&self) -> Option<Incumbent> {
        self.storage.snapshot().incumbent()
    }

    /// Recomputes the best configuration under `aggregation`.
    #[must_use]
    pub fn best_config_by(&self, aggregation: Aggregation) -> Option<Incumbent> {
        self.storage.snapshot().best_config_by(aggregation)
    }

    /// Returns the configuration registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for unknown ids.
    pub fn config(&self, id: ConfigId) -> Result<Configuration> {
        self.storage.snapshot().config(id).cloned()
    }

    /// Returns an immutable view of the ledger.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrialHistory> {
        self.storage.snapshot()
    }

    /// Reloads from the backend's external source, if it has one.
    pub fn refresh(&self) -> bool {
        self.storage.refresh()
    }
}

/// Iterator over trial keys, holding the snapshot it was taken from.
#[derive(Debug)]
pub struct TrialKeys {
    history: Arc<TrialHistory>,
    positions: std::vec::IntoIter<usize>,
    filter: KeyFilter,
}

impl Iterator for TrialKeys {
    type Item = TrialKey;

    fn next(&mut self) -> Option<TrialKey> {
        loop {
            let key = self.history.key_at(self.positions.next()?);
            if self.filter.matches(key) {
                return Some(key.clone());
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.positions.size_hint().1)
    }
}
