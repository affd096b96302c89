//! Run - one tracked job with a step-indexed log
//!
//! ## Step model
//!
//! ```text
//! log[0] = { loss: 0.5 }
//! log[1] = { loss: 0.3, acc: 0.9 }   <- `acc` joined the open row
//! log[2] = { loss: 0.2 }             <- repeated `loss` opened a new row
//! ```
//!
//! Without an explicit step, a `track` call continues the last row unless one
//! of its keys is already there, in which case it opens a new row. A key may
//! appear at most once per row.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_track::root::{MemoryRoot, RunSet};
//! use trueno_track::run::Run;
//!
//! # fn main() -> trueno_track::Result<()> {
//! let root = Arc::new(MemoryRoot::new());
//! let mut run = Run::builder(root.clone())
//!     .experiment("mnist")
//!     .config(&serde_json::json!({"lr": 0.01}))
//!     .build();
//!
//! run.track([("loss", 0.5)], None)?;
//! run.track([("loss", 0.3)], None)?;
//! run.track([("acc", 0.9)], None)?;
//! assert_eq!(run.step_count(), 2);
//!
//! run.write()?;
//! assert_eq!(root.len()?, 1);
//! # Ok(())
//! # }
//! ```

mod annotate;
mod info;

pub use annotate::{fnmatch, ProgressSink, DEFAULT_PATTERN};
pub use info::{RunInfo, RunInfoBuilder, RESERVED_INFO_KEYS};

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::config::{Config, ConfigSource};
use crate::root::{Root, RunData};
use crate::value::{Trackable, Value, ValueConverter};
use crate::{Error, Result};

/// One step-row: key to value, each key at most once
pub type Row = BTreeMap<String, Value>;

/// Ordered step-rows of a run
pub type Log = Vec<Row>;

/// A live tracked run.
///
/// Owns its log, config snapshot and info block. Holds a handle to the root it
/// writes to but never reads stored state back.
pub struct Run {
    root: Arc<dyn Root>,
    log: Log,
    config: Config,
    info: RunInfo,
    merged_latest: FxHashMap<String, (usize, Value)>,
    converter: ValueConverter,
    // cleared by a write, set again by any change to log, config or info
    dirty: bool,
}

impl Run {
    /// Create a run with an empty experiment name, no tags and empty config.
    #[must_use]
    pub fn new(root: Arc<dyn Root>) -> Self {
        Self::builder(root).build()
    }

    /// Create a builder for a run writing to `root`.
    #[must_use]
    pub fn builder(root: Arc<dyn Root>) -> RunBuilder {
        RunBuilder::new(root)
    }

    /// Get the run UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        self.info.uuid()
    }

    /// Get the info block.
    #[must_use]
    pub const fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Get the log.
    #[must_use]
    pub fn log(&self) -> &[Row] {
        &self.log
    }

    /// Number of step-rows (highest step + 1).
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.log.len()
    }

    /// Get the config snapshot.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the config snapshot.
    pub fn config_mut(&mut self) -> &mut Config {
        self.dirty = true;
        &mut self.config
    }

    /// Replace the config with a deep copy of `source`'s current contents.
    pub fn record_config(&mut self, source: &(impl ConfigSource + ?Sized)) {
        self.config = source.snapshot();
        self.dirty = true;
    }

    /// Set an extra info entry.
    ///
    /// # Errors
    /// Returns `Error::ReservedInfoKey` if `key` names a built-in info field
    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Result<()> {
        self.info.set_extra(key, value)?;
        self.dirty = true;
        Ok(())
    }

    /// Any info field, built-in or extra.
    #[must_use]
    pub fn info_value(&self, key: &str) -> Option<serde_json::Value> {
        self.info.get(key)
    }

    /// Latest `(step, value)` of every tracked key.
    #[must_use]
    pub const fn merged_latest(&self) -> &FxHashMap<String, (usize, Value)> {
        &self.merged_latest
    }

    /// Latest `(step, value)` of one key.
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<&(usize, Value)> {
        self.merged_latest.get(key)
    }

    /// Track key/value pairs into a step-row.
    ///
    /// With `step = None` the step is inferred: 0 for an empty log, a new row
    /// if any key already exists in the last row, the last row otherwise.
    /// Rows up to `step` are created as needed.
    ///
    /// Values the converter does not support are dropped with a warning.
    ///
    /// # Errors
    /// - `Error::DuplicateKey` if a key already exists in the target row or
    ///   repeats within `kv`; the log is left unchanged
    /// - converter failures such as `Error::NotImplemented` for images; the log
    ///   is left unchanged
    pub fn track<I, K, V>(&mut self, kv: I, step: Option<usize>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Trackable>,
    {
        let entries: Vec<(String, Trackable)> =
            kv.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let step = step.unwrap_or_else(|| self.infer_step(&entries));

        let mut overlap: Vec<String> = {
            let target = self.log.get(step);
            let mut seen = FxHashSet::default();
            entries
                .iter()
                .filter(|(key, _)| {
                    !seen.insert(key.as_str()) || target.is_some_and(|row| row.contains_key(key))
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        if !overlap.is_empty() {
            overlap.sort();
            overlap.dedup();
            return Err(Error::DuplicateKey { step, keys: overlap });
        }

        let mut converted = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let kind = value.kind().to_string();
            match self.converter.convert(value)? {
                Some(stored) => converted.push((key, stored)),
                None => warn!(key = %key, kind = %kind, step, "skipping unsupported value"),
            }
        }

        let rows = step
            .checked_add(1)
            .ok_or_else(|| Error::InvalidInput(format!("step {step} is out of range")))?;
        if self.log.len() < rows {
            self.log.resize_with(rows, Row::new);
        }
        self.dirty = true;
        for (key, value) in converted {
            let newer = self
                .merged_latest
                .get(&key)
                .map_or(true, |(latest_step, _)| step >= *latest_step);
            if newer {
                self.merged_latest.insert(key.clone(), (step, value.clone()));
            }
            self.log[step].insert(key, value);
        }
        Ok(())
    }

    /// Track into an explicit step.
    ///
    /// # Errors
    /// Same as [`Run::track`]
    pub fn track_at<I, K, V>(&mut self, kv: I, step: usize) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Trackable>,
    {
        self.track(kv, Some(step))
    }

    fn infer_step(&self, entries: &[(String, Trackable)]) -> usize {
        let step = match self.log.last() {
            None => 0,
            Some(last) if entries.iter().any(|(key, _)| last.contains_key(key)) => self.log.len(),
            Some(_) => self.log.len() - 1,
        };
        debug!(step, keys = entries.len(), "inferred step");
        step
    }

    /// Snapshot of `(log, config, info)` as it would be persisted.
    #[must_use]
    pub fn to_run_data(&self) -> RunData {
        RunData::new(self.log.clone(), self.config.clone(), self.info.clone())
    }

    /// Persist to the run's own root, stamping the end time if the run
    /// changed since the last write.
    ///
    /// # Errors
    /// Propagates storage failures from the root
    pub fn write(&mut self) -> Result<()> {
        let root = Arc::clone(&self.root);
        self.write_to(root.as_ref())
    }

    /// Persist to another root.
    ///
    /// The end time is stamped only when the run changed since the last
    /// write, so copying a written run to a second root stores the same info.
    ///
    /// # Errors
    /// Propagates storage failures from the root
    pub fn write_to(&mut self, root: &dyn Root) -> Result<()> {
        if self.dirty {
            self.info.finish();
        }
        root.save_run(&self.to_run_data())?;
        self.dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("info", &self.info)
            .field("steps", &self.log.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for `Run`.
pub struct RunBuilder {
    root: Arc<dyn Root>,
    experiment: String,
    tags: Vec<String>,
    config: Config,
    converter: ValueConverter,
}

impl RunBuilder {
    /// Create a new builder targeting `root`.
    #[must_use]
    pub fn new(root: Arc<dyn Root>) -> Self {
        Self {
            root,
            experiment: String::new(),
            tags: Vec::new(),
            config: Config::new(),
            converter: ValueConverter::default(),
        }
    }

    /// Set the experiment name.
    #[must_use]
    pub fn experiment(mut self, experiment: impl Into<String>) -> Self {
        self.experiment = experiment.into();
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Snapshot the configuration from `source`.
    #[must_use]
    pub fn config(mut self, source: &(impl ConfigSource + ?Sized)) -> Self {
        self.config = source.snapshot();
        self
    }

    /// Use a custom value converter.
    #[must_use]
    pub fn converter(mut self, converter: ValueConverter) -> Self {
        self.converter = converter;
        self
    }

    /// Build the `Run`, starting its clock now.
    #[must_use]
    pub fn build(self) -> Run {
        Run {
            root: self.root,
            log: Log::new(),
            config: self.config,
            info: RunInfo::builder(self.experiment).tags(self.tags).build(),
            merged_latest: FxHashMap::default(),
            converter: self.converter,
            dirty: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{MemoryRoot, RunSet};
    use crate::tensor::Tensor;
    use crate::value::Image;

    fn run() -> Run {
        Run::new(Arc::new(MemoryRoot::new()))
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_repeat_key_opens_new_step() {
        let mut run = run();
        run.track([("loss", 0.5)], None).unwrap();
        run.track([("loss", 0.3)], None).unwrap();
        run.track([("acc", 0.9)], None).unwrap();

        assert_eq!(
            run.log(),
            &[
                row(&[("loss", Value::Float(0.5))]),
                row(&[("loss", Value::Float(0.3)), ("acc", Value::Float(0.9))]),
            ]
        );
    }

    #[test]
    fn test_overlap_at_explicit_step_fails() {
        let mut run = run();
        run.track([("a", 1), ("b", 2)], Some(0)).unwrap();
        let err = run.track([("a", 1), ("b", 2)], Some(0)).unwrap_err();
        match err {
            Error::DuplicateKey { step, keys } => {
                assert_eq!(step, 0);
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(run.log(), &[row(&[("a", Value::Int(1)), ("b", Value::Int(2))])]);
    }

    #[test]
    fn test_duplicate_within_call_fails() {
        let mut run = run();
        let err = run.track(vec![("x", 1), ("x", 2)], None).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { step: 0, .. }));
        assert_eq!(run.step_count(), 0);
    }

    #[test]
    fn test_explicit_step_fills_gap() {
        let mut run = run();
        run.track_at([("x", 1)], 3).unwrap();
        assert_eq!(run.step_count(), 4);
        assert!(run.log()[..3].iter().all(BTreeMap::is_empty));
    }

    #[test]
    fn test_merged_latest_keeps_highest_step() {
        let mut run = run();
        run.track_at([("loss", 0.9)], 2).unwrap();
        run.track_at([("loss", 0.1)], 0).unwrap();
        assert_eq!(run.latest("loss"), Some(&(2, Value::Float(0.9))));
        run.track_at([("loss", 0.5)], 5).unwrap();
        assert_eq!(run.latest("loss"), Some(&(5, Value::Float(0.5))));
    }

    #[test]
    fn test_unsupported_values_are_dropped() {
        let mut run = run();
        run.track(
            vec![
                ("ok", Trackable::Float(1.0)),
                ("none", Trackable::Null),
                ("socket", Trackable::Opaque("socket".into())),
            ],
            None,
        )
        .unwrap();
        assert_eq!(run.log(), &[row(&[("ok", Value::Float(1.0))])]);
        assert!(run.latest("none").is_none());
    }

    #[test]
    fn test_image_value_fails_without_partial_write() {
        let mut run = run();
        let img = Image {
            width: 2,
            height: 1,
            channels: 1,
            pixels: vec![0, 255],
        };
        let err = run
            .track(vec![("a", Trackable::Int(1)), ("img", img.into())], None)
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
        assert_eq!(run.step_count(), 0);
    }

    #[test]
    fn test_tensor_is_stored_as_npy() {
        let mut run = run();
        let t = Tensor::from_f64(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        run.track([("weights", t.clone())], None).unwrap();
        assert_eq!(run.log()[0]["weights"].to_tensor().unwrap(), t);
    }

    #[test]
    fn test_record_config_takes_a_copy() {
        let mut run = run();
        let mut source = serde_json::json!({"lr": 0.1});
        run.record_config(&source);
        source["lr"] = serde_json::json!(0.2);
        assert_eq!(run.config()["lr"], serde_json::json!(0.1));
    }

    #[test]
    fn test_write_sends_snapshot_to_root() {
        let root = Arc::new(MemoryRoot::new());
        let mut run = Run::builder(root.clone())
            .experiment("exp")
            .tags(["smoke"])
            .build();
        run.track([("loss", 1.0)], None).unwrap();
        run.write().unwrap();

        let stored = crate::root::RunSet::run(root.as_ref(), run.uuid()).unwrap().unwrap();
        assert_eq!(stored, run.to_run_data());
        assert!(stored.info().end_time() >= stored.info().start_time());
    }

    #[test]
    fn test_step_past_usize_max_is_rejected() {
        let mut run = run();
        run.track([("x", 1)], None).unwrap();
        let err = run.track_at([("x", 2)], usize::MAX).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(run.step_count(), 1);
        assert_eq!(run.log()[0].get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_end_time_stamped_once_per_change() {
        let own = Arc::new(MemoryRoot::new());
        let other = MemoryRoot::new();
        let mut run = Run::new(own.clone());
        run.track([("loss", 0.5)], None).unwrap();
        run.write().unwrap();
        let first = run.info().end_time();
        run.write_to(&other).unwrap();
        assert_eq!(run.info().end_time(), first);
        assert_eq!(
            own.run(run.uuid()).unwrap().unwrap().info(),
            other.run(run.uuid()).unwrap().unwrap().info()
        );

        std::thread::sleep(std::time::Duration::from_millis(2));
        run.track([("loss", 0.4)], None).unwrap();
        run.write().unwrap();
        assert!(run.info().end_time() > first);
    }

    #[test]
    fn test_write_to_other_root() {
        let own = Arc::new(MemoryRoot::new());
        let other = MemoryRoot::new();
        let mut run = Run::new(own.clone());
        run.write_to(&other).unwrap();
        assert!(crate::root::RunSet::is_empty(own.as_ref()).unwrap());
        assert_eq!(crate::root::RunSet::len(&other).unwrap(), 1);
    }
}
