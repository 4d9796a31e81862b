use std::sync::Arc;

use parking_lot::RwLock;

use super::{ConfigId, Storage, TrialHistory};
use crate::error::Result;
use crate::param::Configuration;
use crate::trial::{TrialKey, TrialRecord};
use crate::types::Aggregation;

/// In-memory trial storage (the default).
///
/// This is a thin wrapper around `RwLock<Arc<TrialHistory>>`. Writers
/// modify the history in place when no snapshot is outstanding and clone
/// it otherwise, so snapshots handed out earlier never change.
pub struct MemoryStorage {
    history: RwLock<Arc<TrialHistory>>,
}

impl MemoryStorage {
    /// Creates a new, empty in-memory store using mean aggregation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_aggregation(Aggregation::Mean)
    }

    /// Creates a new, empty in-memory store with a custom aggregation.
    #[must_use]
    pub fn with_aggregation(aggregation: Aggregation) -> Self {
        Self::with_history(TrialHistory::new(aggregation))
    }

    /// Creates an in-memory store pre-populated with `history`.
    #[must_use]
    pub fn with_history(history: TrialHistory) -> Self {
        Self {
            history: RwLock::new(Arc::new(history)),
        }
    }

    /// Replaces the whole ledger.
    #[cfg(feature = "journal")]
    pub(crate) fn replace(&self, history: TrialHistory) {
        *self.history.write() = Arc::new(history);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn register(&self, config: Configuration) -> ConfigId {
        if let Some(id) = self.history.read().config_id(&config) {
            return id;
        }
        let mut guard = self.history.write();
        Arc::make_mut(&mut *guard).register(config)
    }

    fn append(&self, key: TrialKey, record: TrialRecord) -> Result<()> {
        let mut guard = self.history.write();
        if guard.get(&key).is_ok() {
            return Err(crate::Error::DuplicateKey(key));
        }
        Arc::make_mut(&mut *guard).insert(key, record)
    }

    fn snapshot(&self) -> Arc<TrialHistory> {
        Arc::clone(&*self.history.read())
    }
}
