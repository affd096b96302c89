//! Run storage and the query entry point
//!
//! ## Contract
//!
//! ```text
//! RunSet (read side)            Root: RunSet (write side)
//!   uuids(within)                 save_run(&RunData)
//!   config(uuid)
//!   run(uuid)
//!   get / filter / group_by / aggregate   (provided)
//! ```
//!
//! Roots ([`MemoryRoot`], [`DirRoot`]) and query views
//! ([`FilterView`](crate::query::FilterView)) are all `RunSet`s, so queries
//! compose: a filtered view can be filtered, grouped or aggregated again.
//!
//! Unknown uuids are simply absent from results; they are never an error.

pub mod dir;
pub mod memory;

pub use dir::{DirRoot, DirRootBuilder};
pub use memory::MemoryRoot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::query::aggregate::{self, Aggregation};
use crate::query::group::{self, GroupKey, GroupSpec};
use crate::query::FilterView;
use crate::run::{Log, RunInfo};
use crate::Result;

/// Persisted shape of one run: `(log, config, info)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    log: Log,
    config: Config,
    info: RunInfo,
}

impl RunData {
    /// Assemble run data from its parts.
    #[must_use]
    pub const fn new(log: Log, config: Config, info: RunInfo) -> Self {
        Self { log, config, info }
    }

    /// Get the run UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        self.info.uuid()
    }

    /// Get the log.
    #[must_use]
    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Get the config.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Get the info block.
    #[must_use]
    pub const fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Split into `(log, config, info)`.
    #[must_use]
    pub fn into_parts(self) -> (Log, Config, RunInfo) {
        (self.log, self.config, self.info)
    }
}

/// Several runs as parallel columns, in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiRunData {
    /// Logs, one per run
    pub logs: Vec<Log>,
    /// Configs, one per run
    pub configs: Vec<Config>,
    /// Info blocks, one per run
    pub infos: Vec<RunInfo>,
}

impl MultiRunData {
    /// Number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True if there are no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// UUIDs in order.
    #[must_use]
    pub fn uuids(&self) -> Vec<&str> {
        self.infos.iter().map(RunInfo::uuid).collect()
    }

    /// Append one run.
    pub fn push(&mut self, run: RunData) {
        let (log, config, info) = run.into_parts();
        self.logs.push(log);
        self.configs.push(config);
        self.infos.push(info);
    }

    /// Re-assemble per-run triples.
    #[must_use]
    pub fn into_runs(self) -> Vec<RunData> {
        self.logs
            .into_iter()
            .zip(self.configs)
            .zip(self.infos)
            .map(|((log, config), info)| RunData::new(log, config, info))
            .collect()
    }
}

impl IntoIterator for MultiRunData {
    type Item = RunData;
    type IntoIter = std::vec::IntoIter<RunData>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_runs().into_iter()
    }
}

impl FromIterator<RunData> for MultiRunData {
    fn from_iter<I: IntoIterator<Item = RunData>>(iter: I) -> Self {
        let mut out = Self::default();
        for run in iter {
            out.push(run);
        }
        out
    }
}

/// Read side of a run collection.
///
/// Implementors provide uuid listing and per-uuid lookups; querying
/// (`get`, `filter`, `group_by`, `aggregate`) is provided on top.
pub trait RunSet {
    /// UUIDs of the runs in this set.
    ///
    /// With `within = None`, every run in native order (commit order for the
    /// bundled roots). Otherwise the members of `within` present in this set,
    /// in the requested order.
    ///
    /// # Errors
    /// Propagates storage failures
    fn uuids(&self, within: Option<&[String]>) -> Result<Vec<String>>;

    /// Config of one run, `None` if the run is not in this set.
    ///
    /// # Errors
    /// Propagates storage and decoding failures
    fn config(&self, uuid: &str) -> Result<Option<Config>>;

    /// Full data of one run, `None` if the run is not in this set.
    ///
    /// # Errors
    /// Propagates storage and decoding failures
    fn run(&self, uuid: &str) -> Result<Option<RunData>>;

    /// Logs, configs and infos of the requested (or all) runs.
    ///
    /// # Errors
    /// Propagates storage and decoding failures
    fn get(&self, uuids: Option<&[String]>) -> Result<MultiRunData> {
        let mut out = MultiRunData::default();
        for uuid in self.uuids(uuids)? {
            if let Some(run) = self.run(&uuid)? {
                out.push(run);
            }
        }
        Ok(out)
    }

    /// Configs of the requested (or all) runs.
    ///
    /// # Errors
    /// Propagates storage and decoding failures
    fn configs(&self, uuids: Option<&[String]>) -> Result<Vec<Config>> {
        let mut out = Vec::new();
        for uuid in self.uuids(uuids)? {
            if let Some(config) = self.config(&uuid)? {
                out.push(config);
            }
        }
        Ok(out)
    }

    /// Number of runs.
    ///
    /// # Errors
    /// Propagates storage failures
    fn len(&self) -> Result<usize> {
        Ok(self.uuids(None)?.len())
    }

    /// True if the set holds no runs.
    ///
    /// # Errors
    /// Propagates storage failures
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Lazy view over this set; add predicates with the builder methods.
    fn filter(&self) -> FilterView<'_>
    where
        Self: Sized,
    {
        FilterView::new(self)
    }

    /// Partition by a derived key, in first-seen order.
    ///
    /// # Errors
    /// `Error::InvalidGroupSpec` for an empty field list; storage failures
    fn group_by(&self, spec: impl Into<GroupSpec>) -> Result<Vec<(GroupKey, FilterView<'_>)>>
    where
        Self: Sized,
    {
        group::group_by(self, spec.into())
    }

    /// Step-wise reduction of `key` across every run in the set.
    ///
    /// # Errors
    /// See [`Aggregation`] for the shape policy
    fn aggregate(&self, key: &str, aggr: Aggregation) -> Result<Vec<f64>> {
        aggregate::aggregate(self, key, aggr)
    }
}

/// A store of runs that accepts new ones.
pub trait Root: RunSet + Send + Sync {
    /// Persist one run, replacing any run with the same uuid.
    ///
    /// A run is either fully present or absent to readers.
    ///
    /// # Errors
    /// Propagates encoding and I/O failures
    fn save_run(&self, run: &RunData) -> Result<()>;
}

impl<T: RunSet + ?Sized> RunSet for Arc<T> {
    fn uuids(&self, within: Option<&[String]>) -> Result<Vec<String>> {
        (**self).uuids(within)
    }

    fn config(&self, uuid: &str) -> Result<Option<Config>> {
        (**self).config(uuid)
    }

    fn run(&self, uuid: &str) -> Result<Option<RunData>> {
        (**self).run(uuid)
    }
}

impl<T: Root + ?Sized> Root for Arc<T> {
    fn save_run(&self, run: &RunData) -> Result<()> {
        (**self).save_run(run)
    }
}

/// Keep the members of `within` found by `contains`, in requested order.
pub(crate) fn select_within(
    within: &[String],
    mut contains: impl FnMut(&str) -> Result<bool>,
) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(within.len());
    for uuid in within {
        if contains(uuid)? {
            out.push(uuid.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::Row;

    fn data(uuid: &str) -> RunData {
        RunData::new(vec![Row::new()], Config::new(), RunInfo::builder("exp").uuid(uuid).build())
    }

    #[test]
    fn test_multi_run_data_keeps_columns_aligned() {
        let multi: MultiRunData = ["a", "b", "c"].into_iter().map(data).collect();
        assert_eq!(multi.len(), 3);
        assert_eq!(multi.uuids(), vec!["a", "b", "c"]);
        assert_eq!(multi.logs.len(), multi.configs.len());

        let uuids: Vec<String> = multi.into_iter().map(|run| run.uuid().to_string()).collect();
        assert_eq!(uuids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_select_within_keeps_request_order() {
        let within = vec!["z".to_string(), "x".to_string(), "y".to_string()];
        let picked = select_within(&within, |uuid| Ok(uuid != "x")).unwrap();
        assert_eq!(picked, vec!["z", "y"]);
    }

    #[test]
    fn test_arc_forwards_to_inner_set() {
        let root = Arc::new(MemoryRoot::new());
        root.save_run(&data("r1")).unwrap();
        let shared: Arc<dyn Root> = root;
        assert_eq!(shared.uuids(None).unwrap(), vec!["r1"]);
        assert!(shared.run("r1").unwrap().is_some());
    }
}
