//! In-memory root using `DashMap`.
//!
//! Runs are kept as compressed bytes, exactly as a durable root would store
//! them, so reads always hand out fresh copies. Data is lost on process exit.

use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use tracing::debug;

use super::{select_within, Root, RunData, RunSet};
use crate::codec::{decode_log, encode_log, Compression};
use crate::config::Config;
use crate::run::RunInfo;
use crate::{Error, Result};

struct StoredRun {
    log: Vec<u8>,
    config: Vec<u8>,
    info: RunInfo,
}

/// Root that lives entirely in the memory of the current process.
///
/// Thread-safe: payloads sit in a lock-free concurrent hashmap, and a uuid is
/// appended to the commit-order list only after its payload is in place.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trueno_track::root::{MemoryRoot, RunSet};
/// use trueno_track::run::Run;
///
/// # fn main() -> trueno_track::Result<()> {
/// let root = Arc::new(MemoryRoot::new());
/// let mut run = Run::new(root.clone());
/// run.track([("loss", 0.25)], None)?;
/// run.write()?;
/// assert_eq!(root.uuids(None)?, vec![run.uuid().to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct MemoryRoot {
    runs: DashMap<String, StoredRun>,
    order: Mutex<Vec<String>>,
    compression: Compression,
}

impl MemoryRoot {
    /// Create an empty root with LZ4-compressed logs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_compression(Compression::default())
    }

    /// Create an empty root with the given log compression.
    #[must_use]
    pub fn with_compression(compression: Compression) -> Self {
        Self {
            runs: DashMap::new(),
            order: Mutex::new(Vec::new()),
            compression,
        }
    }

    /// Get compression algorithm
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Remove every run.
    ///
    /// # Errors
    /// Returns error if the order lock is poisoned
    pub fn clear(&self) -> Result<()> {
        let mut order = self.lock_order()?;
        self.runs.clear();
        order.clear();
        Ok(())
    }

    fn lock_order(&self) -> Result<MutexGuard<'_, Vec<String>>> {
        self.order
            .lock()
            .map_err(|_| Error::StorageError("memory root order lock poisoned".to_string()))
    }
}

impl Default for MemoryRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRoot")
            .field("runs", &self.runs.len())
            .field("compression", &self.compression)
            .finish()
    }
}

impl RunSet for MemoryRoot {
    fn uuids(&self, within: Option<&[String]>) -> Result<Vec<String>> {
        match within {
            None => Ok(self.lock_order()?.clone()),
            Some(within) => select_within(within, |uuid| Ok(self.runs.contains_key(uuid))),
        }
    }

    fn config(&self, uuid: &str) -> Result<Option<Config>> {
        match self.runs.get(uuid) {
            Some(stored) => Ok(Some(serde_json::from_slice(&stored.config)?)),
            None => Ok(None),
        }
    }

    fn run(&self, uuid: &str) -> Result<Option<RunData>> {
        let Some(stored) = self.runs.get(uuid) else {
            return Ok(None);
        };
        let log = decode_log(&stored.log)?;
        let config = serde_json::from_slice(&stored.config)?;
        Ok(Some(RunData::new(log, config, stored.info.clone())))
    }
}

impl Root for MemoryRoot {
    fn save_run(&self, run: &RunData) -> Result<()> {
        let stored = StoredRun {
            log: encode_log(run.log(), self.compression)?,
            config: serde_json::to_vec(run.config())?,
            info: run.info().clone(),
        };
        let uuid = run.uuid().to_string();
        let mut order = self.lock_order()?;
        if self.runs.insert(uuid.clone(), stored).is_none() {
            order.push(uuid.clone());
        }
        debug!(uuid = %uuid, steps = run.log().len(), "saved run in memory");
        Ok(())
    }
}
