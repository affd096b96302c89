//! Lazy predicate views over run configs

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::config::Config;
use crate::root::{RunData, RunSet};
use crate::Result;

/// Config predicate
pub type Predicate = Arc<dyn Fn(&Config) -> bool + Send + Sync>;

/// Per-key condition on a config entry.
#[derive(Clone)]
pub enum Constraint {
    /// Entry present and equal to the value
    Equals(Json),
    /// Entry absent or JSON null
    IsNull,
    /// Custom test on the entry (`None` when absent)
    Test(Arc<dyn Fn(Option<&Json>) -> bool + Send + Sync>),
}

impl Constraint {
    /// Custom test constraint.
    #[must_use]
    pub fn test(f: impl Fn(Option<&Json>) -> bool + Send + Sync + 'static) -> Self {
        Self::Test(Arc::new(f))
    }

    /// Equality constraint.
    #[must_use]
    pub fn equals(value: impl Into<Json>) -> Self {
        Self::Equals(value.into())
    }

    /// Evaluate against one config entry.
    #[must_use]
    pub fn holds(&self, entry: Option<&Json>) -> bool {
        match self {
            Self::Equals(expected) => entry == Some(expected),
            Self::IsNull => entry.map_or(true, Json::is_null),
            Self::Test(f) => f(entry),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Self::IsNull => f.write_str("IsNull"),
            Self::Test(_) => f.write_str("Test(<fn>)"),
        }
    }
}

impl From<Json> for Constraint {
    fn from(value: Json) -> Self {
        if value.is_null() {
            Self::IsNull
        } else {
            Self::Equals(value)
        }
    }
}

macro_rules! constraint_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Constraint {
                fn from(value: $t) -> Self {
                    Self::Equals(Json::from(value))
                }
            }
        )*
    };
}

constraint_from!(&str, String, i64, i32, u64, f64, bool);

/// A lazily evaluated subset of a parent run set.
///
/// Holds only the parent reference and a conjunction of predicates over run
/// configs. Every call re-evaluates against the parent, so runs saved after
/// the view was built show up if they match.
///
/// ```rust
/// use std::sync::Arc;
/// use trueno_track::query::Constraint;
/// use trueno_track::root::{MemoryRoot, RunSet};
/// use trueno_track::run::Run;
///
/// # fn main() -> trueno_track::Result<()> {
/// let root = Arc::new(MemoryRoot::new());
/// for lr in [0.1, 0.01] {
///     Run::builder(root.clone())
///         .config(&serde_json::json!({"lr": lr}))
///         .build()
///         .write()?;
/// }
///
/// let small = root
///     .filter()
///     .constraint("lr", Constraint::test(|v| v.and_then(|v| v.as_f64()).is_some_and(|lr| lr < 0.05)));
/// assert_eq!(small.len()?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FilterView<'a> {
    parent: &'a dyn RunSet,
    predicates: Vec<Predicate>,
}

impl<'a> FilterView<'a> {
    /// View over `parent` with no predicates (matches everything).
    #[must_use]
    pub fn new(parent: &'a dyn RunSet) -> Self {
        Self {
            parent,
            predicates: Vec::new(),
        }
    }

    /// View over `parent` with the given predicates.
    #[must_use]
    pub fn with_predicates(parent: &'a dyn RunSet, predicates: Vec<Predicate>) -> Self {
        Self { parent, predicates }
    }

    /// Add a predicate on the whole config.
    #[must_use]
    pub fn predicate(mut self, f: impl Fn(&Config) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Arc::new(f));
        self
    }

    /// Add a constraint on one config key.
    #[must_use]
    pub fn constraint(mut self, key: impl Into<String>, constraint: impl Into<Constraint>) -> Self {
        let key = key.into();
        let constraint = constraint.into();
        self.predicates
            .push(Arc::new(move |config: &Config| constraint.holds(config.get(&key))));
        self
    }

    /// Number of predicates in the conjunction.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    /// True if `config` satisfies every predicate.
    #[must_use]
    pub fn matches(&self, config: &Config) -> bool {
        self.predicates.iter().all(|p| p(config))
    }
}

impl fmt::Debug for FilterView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterView")
            .field("predicates", &self.predicates.len())
            .finish_non_exhaustive()
    }
}

impl RunSet for FilterView<'_> {
    fn uuids(&self, within: Option<&[String]>) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for uuid in self.parent.uuids(within)? {
            if self.config(&uuid)?.is_some() {
                out.push(uuid);
            }
        }
        Ok(out)
    }

    fn config(&self, uuid: &str) -> Result<Option<Config>> {
        Ok(self.parent.config(uuid)?.filter(|config| self.matches(config)))
    }

    fn run(&self, uuid: &str) -> Result<Option<RunData>> {
        if self.config(uuid)?.is_none() {
            return Ok(None);
        }
        self.parent.run(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{MemoryRoot, Root};
    use crate::run::RunInfo;
    use serde_json::json;

    fn root_with(configs: &[Json]) -> MemoryRoot {
        let root = MemoryRoot::new();
        for (i, config) in configs.iter().enumerate() {
            let info = RunInfo::builder("exp").uuid(format!("r{i}")).build();
            let config = config.as_object().cloned().unwrap_or_default();
            root.save_run(&RunData::new(Vec::new(), config, info)).unwrap();
        }
        root
    }

    #[test]
    fn test_empty_view_matches_all() {
        let root = root_with(&[json!({"a": 1}), json!({})]);
        let view = root.filter();
        assert_eq!(view.predicate_count(), 0);
        assert_eq!(view.uuids(None).unwrap(), vec!["r0", "r1"]);
    }

    #[test]
    fn test_constraint_kinds() {
        let root = root_with(&[
            json!({"opt": "adam", "wd": null}),
            json!({"opt": "sgd"}),
            json!({"opt": "adam", "wd": 0.1}),
        ]);

        let adam = root.filter().constraint("opt", "adam");
        assert_eq!(adam.uuids(None).unwrap(), vec!["r0", "r2"]);

        let no_wd = root.filter().constraint("wd", Json::Null);
        assert_eq!(no_wd.uuids(None).unwrap(), vec!["r0", "r1"]);

        let has_wd = root
            .filter()
            .constraint("wd", Constraint::test(|v| v.is_some_and(|v| !v.is_null())));
        assert_eq!(has_wd.uuids(None).unwrap(), vec!["r2"]);
    }

    #[test]
    fn test_predicates_are_conjunctive_and_chain() {
        let root = root_with(&[
            json!({"lr": 0.1, "bs": 32}),
            json!({"lr": 0.1, "bs": 64}),
            json!({"lr": 0.2, "bs": 32}),
        ]);
        let both = root.filter().constraint("lr", 0.1).constraint("bs", 32);
        assert_eq!(both.uuids(None).unwrap(), vec!["r0"]);

        let lr = root.filter().constraint("lr", 0.1);
        let chained = lr.filter().predicate(|c| c.get("bs") == Some(&json!(64)));
        assert_eq!(chained.uuids(None).unwrap(), vec!["r1"]);
        assert!(chained.run("r0").unwrap().is_none());
        assert!(chained.config("r1").unwrap().is_some());
    }

    #[test]
    fn test_view_is_lazy() {
        let root = root_with(&[json!({"lr": 0.1})]);
        let view = root.filter().constraint("lr", 0.1);
        assert_eq!(view.len().unwrap(), 1);

        let info = RunInfo::builder("exp").uuid("late").build();
        let config = json!({"lr": 0.1}).as_object().cloned().unwrap();
        root.save_run(&RunData::new(Vec::new(), config, info)).unwrap();
        assert_eq!(view.len().unwrap(), 2);
    }

    #[test]
    fn test_within_keeps_requested_order() {
        let root = root_with(&[json!({"k": 1}), json!({"k": 1}), json!({"k": 2})]);
        let view = root.filter().constraint("k", 1);
        let within = vec!["r2".to_string(), "r1".to_string(), "r0".to_string()];
        assert_eq!(view.uuids(Some(&within)).unwrap(), vec!["r1", "r0"]);
    }
}
