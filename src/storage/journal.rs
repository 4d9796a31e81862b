//! JSONL-based journal storage backend.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{ConfigId, MemoryStorage, Storage, TrialHistory};
use crate::param::Configuration;
use crate::trial::{TrialKey, TrialRecord};
use crate::types::{Aggregation, Budget, TrialStatus};

/// One line of the journal file.
///
/// Configuration lines precede the trial lines that reference them, so
/// replaying a journal reproduces the same [`ConfigId`]s.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalEntry {
    Config {
        config_id: ConfigId,
        configuration: Configuration,
    },
    Trial {
        config_id: ConfigId,
        instance: Option<String>,
        seed: Option<u64>,
        budget: Option<Budget>,
        cost: Option<f64>,
        status: TrialStatus,
        #[serde(default)]
        statistics: std::collections::HashMap<String, crate::trial::AttrValue>,
    },
}

impl JournalEntry {
    fn trial(key: &TrialKey, record: &TrialRecord) -> Self {
        Self::Trial {
            config_id: key.config_id,
            instance: key.instance.clone(),
            seed: key.seed,
            budget: key.budget,
            cost: record.cost,
            status: record.status,
            statistics: record.statistics.clone(),
        }
    }
}

/// A storage backend that appends registrations and trial results as JSON
/// lines to a file.
///
/// The ledger is kept in memory for fast snapshots and simultaneously
/// persisted. Multiple processes can share the same file: writes take an
/// exclusive file lock, reads a shared one.
///
/// # Examples
///
/// ```no_run
/// use intensify::storage::{JournalStorage, TrialStore};
///
/// let storage = JournalStorage::open("trials.jsonl").unwrap();
/// let store = TrialStore::with_storage(storage);
/// ```
pub struct JournalStorage {
    memory: MemoryStorage,
    path: PathBuf,
    aggregation: Aggregation,
    /// Serialise in-process writes so the file lock is only held briefly.
    write_lock: Mutex<()>,
}

impl JournalStorage {
    /// Creates a journal storage writing to `path` without loading it.
    ///
    /// The file is created on the first write, and anything already in it
    /// is picked up then. Use [`JournalStorage::open`] to resume from an
    /// existing journal eagerly.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            memory: MemoryStorage::new(),
            path: path.as_ref().to_path_buf(),
            aggregation: Aggregation::Mean,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens an existing journal and replays it with mean aggregation.
    ///
    /// A missing file yields an empty storage.
    ///
    /// # Errors
    ///
    /// Returns a [`Storage`](crate::Error::Storage) error if the file
    /// exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_aggregation(path, Aggregation::Mean)
    }

    /// Opens an existing journal and replays it with a custom aggregation.
    ///
    /// # Errors
    ///
    /// See [`JournalStorage::open`].
    pub fn open_with_aggregation(
        path: impl AsRef<Path>,
        aggregation: Aggregation,
    ) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let history = load_history(&path, aggregation)?;
        Ok(Self {
            memory: MemoryStorage::with_history(history),
            path,
            aggregation,
            write_lock: Mutex::new(()),
        })
    }

    /// Runs `f` with the journal file open for appending and exclusively
    /// locked, after pulling in whatever other writers appended.
    ///
    /// Everything that decides what the next line says (ids, duplicate
    /// checks) happens inside `f`, so writers sharing a file serialize
    /// through the lock.
    fn with_locked_file<T>(
        &self,
        f: impl FnOnce(&mut File, &MemoryStorage) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let _guard = self.write_lock.lock();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        file.lock_exclusive()
            .map_err(|e| crate::Error::Storage(e.to_string()))?;

        let result = match replay(BufReader::new(&file), self.aggregation) {
            Ok(on_disk) => {
                self.catch_up(on_disk);
                f(&mut file, &self.memory)
            }
            Err(e) => Err(e),
        };

        file.unlock()
            .map_err(|e| crate::Error::Storage(e.to_string()))?;
        result
    }

    /// Adopts `on_disk` if the file holds more than memory does.
    fn catch_up(&self, on_disk: TrialHistory) -> bool {
        let current = self.memory.snapshot();
        if on_disk.len() > current.len() || on_disk.n_configs() > current.n_configs() {
            trace_debug!(
                trials = on_disk.len(),
                configs = on_disk.n_configs(),
                "journal caught up with other writers"
            );
            self.memory.replace(on_disk);
            true
        } else {
            false
        }
    }
}

fn write_line(file: &mut File, entry: &JournalEntry) -> crate::Result<()> {
    let line = serde_json::to_string(entry).map_err(|e| crate::Error::Storage(e.to_string()))?;
    writeln!(file, "{line}").map_err(|e| crate::Error::Storage(e.to_string()))?;
    file.flush()
        .map_err(|e| crate::Error::Storage(e.to_string()))
}

impl Storage for JournalStorage {
    fn register(&self, config: Configuration) -> ConfigId {
        if let Some(id) = self.memory.snapshot().config_id(&config) {
            return id;
        }
        let persisted = self.with_locked_file(|file, memory| {
            let history = memory.snapshot();
            if let Some(id) = history.config_id(&config) {
                return Ok(id);
            }
            let entry = JournalEntry::Config {
                config_id: ConfigId::new(history.n_configs() as u64),
                configuration: config.clone(),
            };
            write_line(file, &entry)?;
            Ok(memory.register(config.clone()))
        });
        match persisted {
            Ok(id) => id,
            Err(_e) => {
                // The registration stays in memory so the race can go on.
                trace_warn!(error = %_e, "failed to persist configuration");
                self.memory.register(config)
            }
        }
    }

    fn append(&self, key: TrialKey, record: TrialRecord) -> crate::Result<()> {
        self.with_locked_file(|file, memory| {
            let history = memory.snapshot();
            if history.get(&key).is_ok() {
                return Err(crate::Error::DuplicateKey(key));
            }
            history.config(key.config_id)?;
            write_line(file, &JournalEntry::trial(&key, &record))?;
            memory.append(key, record)
        })
    }

    fn snapshot(&self) -> Arc<TrialHistory> {
        self.memory.snapshot()
    }

    fn refresh(&self) -> bool {
        match load_history(&self.path, self.aggregation) {
            Ok(loaded) => self.catch_up(loaded),
            Err(_e) => {
                trace_warn!(path = %self.path.display(), error = %_e, "failed to reload journal");
                false
            }
        }
    }
}

/// Replay a journal file. Returns an empty history if the file does not exist.
fn load_history(path: &Path, aggregation: Aggregation) -> crate::Result<TrialHistory> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(TrialHistory::new(aggregation));
        }
        Err(e) => return Err(crate::Error::Storage(e.to_string())),
    };

    file.lock_shared()
        .map_err(|e| crate::Error::Storage(e.to_string()))?;
    let history = replay(BufReader::new(&file), aggregation);
    file.unlock()
        .map_err(|e| crate::Error::Storage(e.to_string()))?;
    history
}

/// Rebuilds a ledger from journal lines. The caller holds the file lock.
fn replay(reader: impl BufRead, aggregation: Aggregation) -> crate::Result<TrialHistory> {
    let mut history = TrialHistory::new(aggregation);
    for line in reader.lines() {
        let line = line.map_err(|e| crate::Error::Storage(e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: JournalEntry =
            serde_json::from_str(line).map_err(|e| crate::Error::Storage(e.to_string()))?;
        match entry {
            JournalEntry::Config {
                config_id,
                configuration,
            } => {
                let id = history.register(configuration);
                if id != config_id {
                    return Err(crate::Error::Storage(format!(
                        "journal declares {config_id} but replay assigned {id}"
                    )));
                }
            }
            JournalEntry::Trial {
                config_id,
                instance,
                seed,
                budget,
                cost,
                status,
                statistics,
            } => {
                let key = TrialKey {
                    config_id,
                    instance,
                    seed,
                    budget,
                };
                let record = TrialRecord {
                    cost,
                    status,
                    statistics,
                };
                history.insert(key, record)?;
            }
        }
    }

    Ok(history)
}
