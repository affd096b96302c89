//! Tracked values and the converter that normalizes them for storage
//!
//! Callers hand [`Run::track`](crate::run::Run::track) anything that converts
//! into a [`Trackable`]. The [`ValueConverter`] walks an ordered rule table and
//! produces a storable [`Value`], decides to skip the input, or fails loudly
//! for kinds whose encoding is not defined yet (images).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;
use crate::{Error, Result};

/// Storable value held in a run's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string
    Str(String),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Wall-clock timestamp
    Timestamp(DateTime<Utc>),
    /// Portable binary payload (NPY-encoded tensors)
    Bytes(Vec<u8>),
}

impl Value {
    /// Numeric view of `Int` and `Float` values
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of `Str` values
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Payload of `Bytes` values
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Decode a `Bytes` value back into a tensor.
    ///
    /// # Errors
    /// Returns error if the value is not `Bytes` or is not valid NPY data
    pub fn to_tensor(&self) -> Result<Tensor> {
        let bytes = self
            .as_bytes()
            .ok_or_else(|| Error::InvalidTensor(format!("{} value is not a tensor", self.kind())))?;
        Tensor::from_npy(bytes)
    }

    /// Short name of the variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Image-like value. Tracking one is rejected until an encoding is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Interleaved channels per pixel
    pub channels: u8,
    /// Row-major pixel bytes
    pub pixels: Vec<u8>,
}

/// Any value a caller may hand to `track`, before conversion
#[derive(Debug, Clone, PartialEq)]
pub enum Trackable {
    /// Absent value
    Null,
    /// String
    Str(String),
    /// Integer (booleans arrive here as 0 / 1)
    Int(i64),
    /// Float
    Float(f64),
    /// Timestamp
    Timestamp(DateTime<Utc>),
    /// Numeric array
    Tensor(Tensor),
    /// Image-like object
    Image(Image),
    /// A value of a kind the tracker does not know, identified by name
    Opaque(String),
}

impl Trackable {
    /// Short name of the input kind, used in diagnostics
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Str(_) => "str",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Timestamp(_) => "timestamp",
            Self::Tensor(_) => "tensor",
            Self::Image(_) => "image",
            Self::Opaque(name) => name,
        }
    }
}

impl From<&str> for Trackable {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Trackable {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for Trackable {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Trackable {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Trackable {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for Trackable {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Self::Float(v as f64), Self::Int)
    }
}

impl From<usize> for Trackable {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(Self::Float(v as f64), Self::Int)
    }
}

impl From<bool> for Trackable {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Trackable {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for Trackable {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<DateTime<Utc>> for Trackable {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Tensor> for Trackable {
    fn from(v: Tensor) -> Self {
        Self::Tensor(v)
    }
}

impl From<Image> for Trackable {
    fn from(v: Image) -> Self {
        Self::Image(v)
    }
}

impl From<Value> for Trackable {
    fn from(v: Value) -> Self {
        match v {
            Value::Str(s) => Self::Str(s),
            Value::Int(i) => Self::Int(i),
            Value::Float(f) => Self::Float(f),
            Value::Timestamp(t) => Self::Timestamp(t),
            Value::Bytes(b) => Tensor::from_npy(&b)
                .map_or_else(|_| Self::Opaque("bytes".to_string()), Self::Tensor),
        }
    }
}

impl From<serde_json::Value> for Trackable {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::from(b),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Opaque("json number".to_string())),
            Json::String(s) => Self::Str(s),
            Json::Array(_) => Self::Opaque("json array".to_string()),
            Json::Object(_) => Self::Opaque("json object".to_string()),
        }
    }
}

impl<T: Into<Self>> From<Option<T>> for Trackable {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

type Matcher = Arc<dyn Fn(&Trackable) -> bool + Send + Sync>;
type Converter = Arc<dyn Fn(Trackable) -> Result<Option<Value>> + Send + Sync>;

#[derive(Clone)]
struct Rule {
    name: String,
    matches: Matcher,
    convert: Converter,
}

/// Ordered table of `(matcher, converter)` rules.
///
/// The first rule whose matcher accepts a value converts it. A converter
/// returns `Ok(None)` to drop the value; when no rule matches the value is
/// dropped as unsupported. Either way the caller logs a warning and keeps
/// tracking.
#[derive(Clone)]
pub struct ValueConverter {
    rules: Vec<Rule>,
}

impl ValueConverter {
    /// Converter with the built-in rules only
    #[must_use]
    pub fn new() -> Self {
        let mut converter = Self { rules: Vec::new() };
        converter.push(
            "scalar",
            |v| {
                matches!(
                    v,
                    Trackable::Str(_) | Trackable::Int(_) | Trackable::Float(_) | Trackable::Timestamp(_)
                )
            },
            |v| {
                Ok(match v {
                    Trackable::Str(s) => Some(Value::Str(s)),
                    Trackable::Int(i) => Some(Value::Int(i)),
                    Trackable::Float(f) => Some(Value::Float(f)),
                    Trackable::Timestamp(t) => Some(Value::Timestamp(t)),
                    _ => None,
                })
            },
        );
        converter.push(
            "tensor",
            |v| matches!(v, Trackable::Tensor(_)),
            |v| match v {
                Trackable::Tensor(t) => t.to_npy().map(|npy| Some(Value::Bytes(npy))),
                _ => Ok(None),
            },
        );
        converter.push(
            "image",
            |v| matches!(v, Trackable::Image(_)),
            |_| Err(Error::NotImplemented("tracking image values".to_string())),
        );
        converter
    }

    /// Add a rule ahead of every existing rule
    #[must_use]
    pub fn with_rule(
        mut self,
        name: impl Into<String>,
        matches: impl Fn(&Trackable) -> bool + Send + Sync + 'static,
        convert: impl Fn(Trackable) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.rules.insert(
            0,
            Rule {
                name: name.into(),
                matches: Arc::new(matches),
                convert: Arc::new(convert),
            },
        );
        self
    }

    fn push(
        &mut self,
        name: &str,
        matches: impl Fn(&Trackable) -> bool + Send + Sync + 'static,
        convert: impl Fn(Trackable) -> Result<Option<Value>> + Send + Sync + 'static,
    ) {
        self.rules.push(Rule {
            name: name.to_string(),
            matches: Arc::new(matches),
            convert: Arc::new(convert),
        });
    }

    /// Rule names in evaluation order
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Convert one value.
    ///
    /// `Ok(None)` means the value should be skipped.
    ///
    /// # Errors
    /// Propagates converter failures, e.g. `Error::NotImplemented` for images
    pub fn convert(&self, value: Trackable) -> Result<Option<Value>> {
        match self.rules.iter().find(|r| (r.matches)(&value)) {
            Some(rule) => (rule.convert)(value),
            None => Ok(None),
        }
    }
}

impl Default for ValueConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValueConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueConverter")
            .field("rules", &self.rule_names())
            .finish()
    }
}
