//! Run info block - identity and timing metadata of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::{Error, Result};

/// Built-in info fields; extra entries may not reuse these names.
pub const RESERVED_INFO_KEYS: [&str; 5] = ["uuid", "experiment", "tags", "start_time", "end_time"];

/// Metadata of one run.
///
/// Serialized as a flat JSON object: the built-in fields plus any extra
/// entries set through [`RunInfo::set_extra`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    uuid: String,
    experiment: String,
    tags: Vec<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(flatten)]
    extra: Config,
}

impl RunInfo {
    /// Info for a new run with a fresh UUID v4, started now.
    #[must_use]
    pub fn new(experiment: impl Into<String>) -> Self {
        Self::builder(experiment).build()
    }

    /// Create a builder for constructing info with explicit fields.
    #[must_use]
    pub fn builder(experiment: impl Into<String>) -> RunInfoBuilder {
        RunInfoBuilder::new(experiment)
    }

    /// Get the run UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Get the end timestamp (equal to the start until the run is written).
    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Get the extra info entries.
    #[must_use]
    pub const fn extra(&self) -> &Config {
        &self.extra
    }

    /// Any info field, built-in or extra, as JSON.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        match key {
            "uuid" => Some(Json::String(self.uuid.clone())),
            "experiment" => Some(Json::String(self.experiment.clone())),
            "tags" => Some(Json::from(self.tags.clone())),
            "start_time" => Some(Json::String(self.start_time.to_rfc3339())),
            "end_time" => Some(Json::String(self.end_time.to_rfc3339())),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// Set an extra info entry.
    ///
    /// # Errors
    /// Returns `Error::ReservedInfoKey` if `key` names a built-in field
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Result<()> {
        let key = key.into();
        if RESERVED_INFO_KEYS.contains(&key.as_str()) {
            return Err(Error::ReservedInfoKey(key));
        }
        self.extra.insert(key, value.into());
        Ok(())
    }

    /// Stamp the end time.
    pub(crate) fn finish(&mut self) {
        self.end_time = Utc::now();
    }

    /// Comma-joined tags, as stored in run indexes.
    #[must_use]
    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }
}

/// Builder for `RunInfo`.
#[derive(Debug)]
pub struct RunInfoBuilder {
    uuid: Option<String>,
    experiment: String,
    tags: Vec<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl RunInfoBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(experiment: impl Into<String>) -> Self {
        Self {
            uuid: None,
            experiment: experiment.into(),
            tags: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Set an explicit UUID (useful for deserialization/testing).
    #[must_use]
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the tags.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set a custom start timestamp.
    #[must_use]
    pub const fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Set a custom end timestamp.
    #[must_use]
    pub const fn end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Build the `RunInfo`.
    #[must_use]
    pub fn build(self) -> RunInfo {
        RunInfo {
            uuid: self.uuid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            experiment: self.experiment,
            tags: self.tags,
            start_time: self.start_time,
            end_time: self.end_time.unwrap_or(self.start_time),
            extra: Config::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_info_has_unique_uuid() {
        let a = RunInfo::new("exp");
        let b = RunInfo::new("exp");
        assert_ne!(a.uuid(), b.uuid());
        assert_eq!(a.end_time(), a.start_time());
        assert!(Uuid::parse_str(a.uuid()).is_ok());
    }

    #[test]
    fn test_reserved_keys_rejected() {
        let mut info = RunInfo::new("exp");
        for key in RESERVED_INFO_KEYS {
            assert!(matches!(info.set_extra(key, 1), Err(Error::ReservedInfoKey(_))));
        }
        info.set_extra("host", "gpu-01").unwrap();
        assert_eq!(info.get("host"), Some(json!("gpu-01")));
        assert_eq!(info.get("experiment"), Some(json!("exp")));
    }

    #[test]
    fn test_json_is_flat_and_roundtrips() {
        let mut info = RunInfo::builder("exp").uuid("abc").tags(["a", "b"]).build();
        info.set_extra("seed", 3).unwrap();
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["uuid"], json!("abc"));
        assert_eq!(value["seed"], json!(3));
        let back: RunInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.joined_tags(), "a,b");
    }
}
