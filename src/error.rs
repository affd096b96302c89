//! Error types for trueno-track
//!
//! Usage errors (duplicate keys, malformed group specs) fail fast. Value
//! conversion problems never reach this type: they are logged and skipped.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-track error types
#[derive(Error, Debug)]
pub enum Error {
    /// A key was tracked twice into the same step-row
    #[error("Duplicate keys at step {step}: {keys:?}\nUse an explicit step or track into a new row")]
    DuplicateKey {
        /// Target step-row
        step: usize,
        /// Keys already present in that row
        keys: Vec<String>,
    },

    /// Extra info entry collides with a built-in info field
    #[error("Reserved info key: {0}\nBuilt-in fields are uuid, experiment, tags, start_time, end_time")]
    ReservedInfoKey(String),

    /// Grouping specification cannot produce a key
    #[error("Invalid group specification: {0}")]
    InvalidGroupSpec(String),

    /// Caller supplied an out-of-range argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Value kind has no storage encoding yet
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Aggregation over a set with no runs
    #[error("Cannot aggregate '{0}' over an empty run set")]
    EmptyAggregation(String),

    /// Runs have different numbers of step-rows
    #[error("Shape mismatch in run {uuid}: expected {expected} steps, found {found}")]
    ShapeMismatch {
        /// Offending run
        uuid: String,
        /// Step count of the first run
        expected: usize,
        /// Step count of this run
        found: usize,
    },

    /// A step-row lacks the aggregated key
    #[error("Run {uuid} has no value for '{key}' at step {step}")]
    MissingValue {
        /// Offending run
        uuid: String,
        /// Aggregated key
        key: String,
        /// Step missing the key
        step: usize,
    },

    /// Aggregated value is not an integer or float
    #[error("Run {uuid} has a non-numeric value for '{key}' at step {step}")]
    NonNumeric {
        /// Offending run
        uuid: String,
        /// Aggregated key
        key: String,
        /// Step holding the value
        step: usize,
    },

    /// Tensor shape/data mismatch or malformed NPY bytes
    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    /// Log codec failure (compression or framing)
    #[error("Codec error: {0}")]
    Codec(String),

    /// Storage error (layout, locking)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (config and info blocks)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary log encoding error
    #[error("Log encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Run index error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
