//! Flow format descriptors.
//!
//! A [`FlowFormat`] describes the shape of the data travelling on a link.
//! It is a dotted definition string, from generic to specific
//! (`"block.mpegts."`, `"block.rtp."`, `"pic.yuv420p."`), plus a few typed
//! attributes.
//!
//! Downstream nodes usually accept by prefix: a sink for any byte stream
//! accepts `"block."` and therefore every `"block.*"` definition.
//!
//! ```rust
//! use pipework::format::{FlowFormat, FormatValue};
//!
//! let ts = FlowFormat::new("block.mpegts.").with_attr("packet_size", 188u64);
//! assert!(ts.matches_prefix("block."));
//! assert!(!ts.matches_prefix("pic."));
//! assert_eq!(ts.attr("packet_size"), Some(&FormatValue::Uint(188)));
//! ```

use smallvec::SmallVec;
use std::fmt;

/// Typed value of a flow format attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatValue {
    /// Unsigned integer (sizes, rates).
    Uint(u64),
    /// Signed integer.
    Int(i64),
    /// Rational number, e.g. a frame rate.
    Rational(u32, u32),
    /// Free-form string.
    Str(String),
    /// Boolean flag.
    Bool(bool),
}

impl From<u64> for FormatValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<i64> for FormatValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for FormatValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for FormatValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FormatValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Rational(n, d) => write!(f, "{}/{}", n, d),
            Self::Str(v) => write!(f, "\"{}\"", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Description of the data on a link.
///
/// Most formats carry zero to a handful of attributes, kept inline.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFormat {
    def: String,
    attributes: SmallVec<[(String, FormatValue); 4]>,
}

impl FlowFormat {
    /// Create a format with a definition string and no attributes.
    pub fn new(def: impl Into<String>) -> Self {
        Self {
            def: def.into(),
            attributes: SmallVec::new(),
        }
    }

    /// Set an attribute, replacing any previous value under the same key.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<FormatValue>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set an attribute in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<FormatValue>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Look up an attribute.
    pub fn attr(&self, key: &str) -> Option<&FormatValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// The definition string.
    pub fn def(&self) -> &str {
        &self.def
    }

    /// Check whether the definition starts with `prefix`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.def.starts_with(prefix)
    }

    /// Iterate over attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &FormatValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for FlowFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.def)?;
        for (k, v) in &self.attributes {
            write!(f, " {}={}", k, v)?;
        }
        Ok(())
    }
}
