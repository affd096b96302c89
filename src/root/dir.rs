//! Directory-backed root
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!     index.sqlite            runs(id, uuid UNIQUE, experiment, tags, start_time, end_time)
//!     runs/
//!         7ca873a1-9673-4d1d-89d2-82a8b5b52a7a/
//!             log.bin         codec tag + compressed log
//!             config.json
//!             info.json
//! ```
//!
//! ## Commit protocol
//!
//! Each payload file is written to a temp file in the run directory, synced
//! and renamed into place. Only after all three exist is the uuid inserted
//! into the index, inside an immediate SQLite transaction. The index row is
//! the commit point: readers list and load only indexed runs, so a crash
//! mid-save leaves at most an unreferenced directory behind.
//!
//! Several processes may share one root. SQLite's WAL mode and busy timeout
//! serialize index inserts; runs never contend with each other otherwise.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rustc_hash::FxHashSet;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{select_within, Root, RunData, RunSet};
use crate::codec::{decode_log, encode_log, Compression};
use crate::config::Config;
use crate::run::RunInfo;
use crate::{Error, Result};

/// Directory name used by [`discover`]
pub const DEFAULT_DIR_NAME: &str = ".trueno-track";

/// Default wait for a contended index lock
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INDEX_FILE: &str = "index.sqlite";
const RUNS_DIR: &str = "runs";
const LOG_FILE: &str = "log.bin";
const CONFIG_FILE: &str = "config.json";
const INFO_FILE: &str = "info.json";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY,
    uuid TEXT NOT NULL UNIQUE,
    experiment TEXT NOT NULL,
    tags TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
)";

/// Root persisting runs under a directory, indexed by SQLite.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trueno_track::root::{DirRoot, RunSet};
/// use trueno_track::run::Run;
///
/// # fn main() -> trueno_track::Result<()> {
/// let root = Arc::new(DirRoot::open("/tmp/tracked")?);
/// let mut run = Run::new(root.clone());
/// run.track([("loss", 0.25)], None)?;
/// run.write()?;
///
/// let reopened = DirRoot::open("/tmp/tracked")?;
/// assert!(reopened.run(run.uuid())?.is_some());
/// # Ok(())
/// # }
/// ```
pub struct DirRoot {
    path: PathBuf,
    index: Mutex<Connection>,
    compression: Compression,
}

impl DirRoot {
    /// Open (or create) a root at `path` with default options.
    ///
    /// # Errors
    /// Returns error if the directory or index cannot be created
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder(path).open()
    }

    /// Open the root found by [`discover`] from the current directory.
    ///
    /// # Errors
    /// Returns error if the current directory is unreadable or the root
    /// cannot be opened
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::open(discover(&cwd))
    }

    /// Create a builder for a root at `path`.
    #[must_use]
    pub fn builder(path: impl AsRef<Path>) -> DirRootBuilder {
        DirRootBuilder::new(path)
    }

    /// Root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get compression algorithm
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    fn run_dir(&self, uuid: &str) -> Result<PathBuf> {
        let safe = !uuid.is_empty()
            && uuid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(Error::InvalidInput(format!(
                "run uuid '{uuid}' is not usable as a directory name"
            )));
        }
        Ok(self.path.join(RUNS_DIR).join(uuid))
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, Connection>> {
        self.index
            .lock()
            .map_err(|_| Error::StorageError("run index lock poisoned".to_string()))
    }

    fn is_committed(&self, uuid: &str) -> Result<bool> {
        let index = self.lock_index()?;
        let found = index
            .query_row("SELECT 1 FROM runs WHERE uuid = ?1", params![uuid], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn read_config(dir: &Path) -> Result<Config> {
        Ok(serde_json::from_slice(&fs::read(dir.join(CONFIG_FILE))?)?)
    }
}

impl std::fmt::Debug for DirRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirRoot")
            .field("path", &self.path)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

/// Builder for `DirRoot`.
#[derive(Debug)]
pub struct DirRootBuilder {
    path: PathBuf,
    compression: Compression,
    busy_timeout: Duration,
}

impl DirRootBuilder {
    /// Create a new builder with default options.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compression: Compression::default(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set log compression for newly saved runs.
    #[must_use]
    pub const fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set how long to wait when another process holds the index lock.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Create directories and the index, then open the root.
    ///
    /// # Errors
    /// Returns error if the directory or index cannot be created
    pub fn open(self) -> Result<DirRoot> {
        fs::create_dir_all(self.path.join(RUNS_DIR))?;
        let index = Connection::open(self.path.join(INDEX_FILE))?;
        index.busy_timeout(self.busy_timeout)?;
        let mode: String = index.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        index.execute(SCHEMA, [])?;
        debug!(path = ?self.path, journal_mode = %mode, "opened dir root");
        Ok(DirRoot {
            path: self.path,
            index: Mutex::new(index),
            compression: self.compression,
        })
    }
}

/// Where a root should live for work started in `start`.
///
/// The nearest ancestor holding a `.trueno-track/` directory wins; failing
/// that, the root goes next to the nearest `.git`; failing that, into
/// `start` itself.
#[must_use]
pub fn discover(start: &Path) -> PathBuf {
    if let Some(existing) = start
        .ancestors()
        .map(|dir| dir.join(DEFAULT_DIR_NAME))
        .find(|candidate| candidate.is_dir())
    {
        return existing;
    }
    if let Some(repo) = start.ancestors().find(|dir| dir.join(".git").exists()) {
        return repo.join(DEFAULT_DIR_NAME);
    }
    start.join(DEFAULT_DIR_NAME)
}

/// Write `bytes` to `dir/name` through a synced temp file and rename.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

impl RunSet for DirRoot {
    fn uuids(&self, within: Option<&[String]>) -> Result<Vec<String>> {
        let index = self.lock_index()?;
        let mut stmt = index.prepare_cached("SELECT uuid FROM runs ORDER BY id")?;
        let all = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match within {
            None => Ok(all),
            Some(within) => {
                let committed: FxHashSet<&str> = all.iter().map(String::as_str).collect();
                select_within(within, |uuid| Ok(committed.contains(uuid)))
            }
        }
    }

    fn config(&self, uuid: &str) -> Result<Option<Config>> {
        let Ok(dir) = self.run_dir(uuid) else {
            return Ok(None);
        };
        if !self.is_committed(uuid)? {
            return Ok(None);
        }
        Self::read_config(&dir).map(Some)
    }

    fn run(&self, uuid: &str) -> Result<Option<RunData>> {
        let Ok(dir) = self.run_dir(uuid) else {
            return Ok(None);
        };
        if !self.is_committed(uuid)? {
            return Ok(None);
        }
        let log = decode_log(&fs::read(dir.join(LOG_FILE))?)?;
        let config = Self::read_config(&dir)?;
        let info: RunInfo = serde_json::from_slice(&fs::read(dir.join(INFO_FILE))?)?;
        Ok(Some(RunData::new(log, config, info)))
    }
}

impl Root for DirRoot {
    fn save_run(&self, run: &RunData) -> Result<()> {
        let dir = self.run_dir(run.uuid())?;
        fs::create_dir_all(&dir)?;

        write_atomic(&dir, LOG_FILE, &encode_log(run.log(), self.compression)?)?;
        write_atomic(&dir, CONFIG_FILE, &serde_json::to_vec_pretty(run.config())?)?;
        write_atomic(&dir, INFO_FILE, &serde_json::to_vec_pretty(run.info())?)?;
        debug!(uuid = %run.uuid(), dir = ?dir, "wrote run payload");

        let info = run.info();
        let mut index = self.lock_index()?;
        let tx = index.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO runs (uuid, experiment, tags, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(uuid) DO UPDATE SET
                 experiment = excluded.experiment,
                 tags = excluded.tags,
                 start_time = excluded.start_time,
                 end_time = excluded.end_time",
            params![
                info.uuid(),
                info.experiment(),
                info.joined_tags(),
                info.start_time().to_rfc3339_opts(SecondsFormat::Micros, true),
                info.end_time().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        tx.commit()?;
        info!(uuid = %info.uuid(), steps = run.log().len(), "committed run");
        Ok(())
    }
}
