//! Run configuration snapshots
//!
//! The tracker never owns the live configuration. Whatever produces it (an
//! injection layer, a CLI parser, a file loader) implements [`ConfigSource`],
//! and a run takes a deep copy at construction or on
//! [`record_config`](crate::run::Run::record_config).

use std::collections::{BTreeMap, HashMap};

/// Configuration of one run: string keys to JSON values
pub type Config = serde_json::Map<String, serde_json::Value>;

/// Read-only provider of the current configuration
pub trait ConfigSource {
    /// Deep copy of the current contents
    fn snapshot(&self) -> Config;
}

impl ConfigSource for Config {
    fn snapshot(&self) -> Config {
        self.clone()
    }
}

/// Objects snapshot their fields; any other JSON value yields an empty config.
impl ConfigSource for serde_json::Value {
    fn snapshot(&self) -> Config {
        self.as_object().cloned().unwrap_or_default()
    }
}

impl ConfigSource for BTreeMap<String, serde_json::Value> {
    fn snapshot(&self) -> Config {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<S: std::hash::BuildHasher> ConfigSource for HashMap<String, serde_json::Value, S> {
    fn snapshot(&self) -> Config {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
