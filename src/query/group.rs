//! Grouping runs by a key derived from their configs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use super::FilterView;
use crate::config::Config;
use crate::root::RunSet;
use crate::{Error, Result};

/// Field-name to value mapping identifying a group.
///
/// Equality ignores insertion order. Missing config fields map to JSON null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey(BTreeMap<String, Json>);

impl GroupKey {
    /// Empty key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key with one field.
    #[must_use]
    pub fn single(field: impl Into<String>, value: impl Into<Json>) -> Self {
        Self::new().with(field, value)
    }

    /// Add (or replace) a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Json>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Json> {
        self.0.get(field)
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the key has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human-readable label such as `lr=0.1, opt=adam`.
    #[must_use]
    pub fn auto_label(&self) -> String {
        self.0
            .iter()
            .map(|(field, value)| match value {
                Json::String(s) => format!("{field}={s}"),
                other => format!("{field}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Stable text form; equal keys have equal canonical forms.
    #[must_use]
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.auto_label())
    }
}

impl<K: Into<String>, V: Into<Json>> FromIterator<(K, V)> for GroupKey {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// How to derive a [`GroupKey`] from a run config.
#[derive(Clone)]
pub enum GroupSpec {
    /// One config field
    Field(String),
    /// Several config fields; must be non-empty
    Fields(Vec<String>),
    /// Arbitrary key function
    Custom(Arc<dyn Fn(&Config) -> GroupKey + Send + Sync>),
}

impl GroupSpec {
    /// Group by a custom key function.
    #[must_use]
    pub fn custom(f: impl Fn(&Config) -> GroupKey + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Check that keys can be derived.
    ///
    /// # Errors
    /// Returns `Error::InvalidGroupSpec` for an empty field list
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fields(fields) if fields.is_empty() => Err(Error::InvalidGroupSpec(
                "field list must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Derive the key of one config.
    #[must_use]
    pub fn key_for(&self, config: &Config) -> GroupKey {
        let field = |name: &String| (name.clone(), config.get(name).cloned().unwrap_or(Json::Null));
        match self {
            Self::Field(name) => std::iter::once(field(name)).collect(),
            Self::Fields(names) => names.iter().map(field).collect(),
            Self::Custom(f) => f(config),
        }
    }
}

impl fmt::Debug for GroupSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Fields(names) => f.debug_tuple("Fields").field(names).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl From<&str> for GroupSpec {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl From<String> for GroupSpec {
    fn from(field: String) -> Self {
        Self::Field(field)
    }
}

impl From<Vec<String>> for GroupSpec {
    fn from(fields: Vec<String>) -> Self {
        Self::Fields(fields)
    }
}

impl From<Vec<&str>> for GroupSpec {
    fn from(fields: Vec<&str>) -> Self {
        Self::Fields(fields.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for GroupSpec {
    fn from(fields: [&str; N]) -> Self {
        Self::Fields(fields.iter().map(|f| (*f).to_string()).collect())
    }
}

impl From<(&str, &str)> for GroupSpec {
    fn from((a, b): (&str, &str)) -> Self {
        Self::Fields(vec![a.to_string(), b.to_string()])
    }
}

/// Partition `set` into first-seen ordered groups.
///
/// Each group is a lazy view whose predicate re-derives the key, so it
/// tracks later additions to the parent.
pub(crate) fn group_by<'a>(
    set: &'a dyn RunSet,
    spec: GroupSpec,
) -> Result<Vec<(GroupKey, FilterView<'a>)>> {
    spec.validate()?;
    let mut seen = FxHashSet::default();
    let mut groups = Vec::new();
    for uuid in set.uuids(None)? {
        let Some(config) = set.config(&uuid)? else {
            continue;
        };
        let key = spec.key_for(&config);
        if !seen.insert(key.canonical()) {
            continue;
        }
        let (spec, expected) = (spec.clone(), key.clone());
        let view = FilterView::new(set).predicate(move |c| spec.key_for(c) == expected);
        groups.push((key, view));
    }
    debug!(groups = groups.len(), spec = ?spec, "grouped runs");
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::{MemoryRoot, Root, RunData};
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
    fn test_group_key_equality_ignores_order() {
        let a = GroupKey::new().with("x", 1).with("y", "b");
        let b = GroupKey::new().with("y", "b").with("x", 1);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.auto_label(), "x=1, y=b");
        assert_eq!(a.to_string(), a.auto_label());
    }

    #[test]
    fn test_group_by_single_field_first_seen_order() {
        let root = root_with(&[
            json!({"lr": 0.2}),
            json!({"lr": 0.1}),
            json!({"lr": 0.2}),
            json!({}),
        ]);
        let groups = root.group_by("lr").unwrap();
        let keys: Vec<_> = groups.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                GroupKey::single("lr", 0.2),
                GroupKey::single("lr", 0.1),
                GroupKey::single("lr", Json::Null),
            ]
        );
        assert_eq!(groups[0].1.uuids(None).unwrap(), vec!["r0", "r2"]);
        assert_eq!(groups[2].1.uuids(None).unwrap(), vec!["r3"]);
    }

    #[test]
    fn test_group_by_pair_deduplicates() {
        let root = root_with(&[
            json!({"a": 1, "b": "x"}),
            json!({"a": 1, "b": "y"}),
            json!({"a": 1, "b": "x"}),
        ]);
        let groups = root.group_by(("a", "b")).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len().unwrap(), 2);
    }

    #[test]
    fn test_empty_field_list_rejected() {
        let root = root_with(&[json!({"a": 1})]);
        let err = root.group_by(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidGroupSpec(_)));
    }

    #[test]
    fn test_custom_key_function() {
        let root = root_with(&[json!({"bs": 16}), json!({"bs": 128}), json!({"bs": 32})]);
        let spec = GroupSpec::custom(|c| {
            let big = c.get("bs").and_then(Json::as_i64).is_some_and(|bs| bs >= 64);
            GroupKey::single("big", big)
        });
        let groups = root.group_by(spec).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.get("big"), Some(&json!(false)));
        assert_eq!(groups[0].1.uuids(None).unwrap(), vec!["r0", "r2"]);
    }

    #[test]
    fn test_groups_of_filtered_view() {
        let root = root_with(&[
            json!({"opt": "adam", "lr": 0.1}),
            json!({"opt": "sgd", "lr": 0.1}),
            json!({"opt": "adam", "lr": 0.2}),
        ]);
        let adam = root.filter().constraint("opt", "adam");
        let groups = adam.group_by("lr").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.uuids(None).unwrap(), vec!["r0"]);
    }
}
