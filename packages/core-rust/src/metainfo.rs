//! Engine capability descriptor (`metainfo`).
//!
//! A [`Metainfo`] is the free-form document an engine author attaches to a
//! scoring engine to describe its accepted input, produced output, and any
//! tuning parameters. The registry validates that the document is well
//! formed and otherwise treats it as opaque: the original text is kept
//! verbatim and handed back unchanged on every read.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Why a raw metainfo document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetainfoError {
    #[error("metainfo is not valid JSON: {0}")]
    Syntax(String),
    #[error("metainfo must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
}

/// Validated, verbatim capability descriptor.
///
/// Serializes as the original string so that round-trips through the
/// backing store and the REST boundary never reformat it.
#[derive(Clone)]
pub struct Metainfo {
    raw: String,
    value: Value,
}

impl Metainfo {
    /// Validates `raw` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`MetainfoError::Syntax`] if `raw` is not a JSON document and
    /// [`MetainfoError::NotAnObject`] if the top level is not an object.
    pub fn parse(raw: impl Into<String>) -> Result<Self, MetainfoError> {
        let raw = raw.into();
        let value: Value =
            serde_json::from_str(&raw).map_err(|e| MetainfoError::Syntax(e.to_string()))?;
        if !value.is_object() {
            return Err(MetainfoError::NotAnObject {
                found: json_kind(&value),
            });
        }
        Ok(Self { raw, value })
    }

    /// Parses an optional raw document. `None` is valid: the engine declares
    /// no extended capabilities.
    ///
    /// # Errors
    ///
    /// Same as [`Metainfo::parse`].
    pub fn parse_optional(raw: Option<String>) -> Result<Option<Self>, MetainfoError> {
        raw.map(Self::parse).transpose()
    }

    /// The document exactly as it was registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed view of the document.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Looks up a nested field by JSON pointer (e.g. `/output/type`).
    #[must_use]
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        self.value.pointer(path)
    }
}

impl PartialEq for Metainfo {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Metainfo {}

impl fmt::Debug for Metainfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Metainfo").field(&self.raw).finish()
    }
}

impl Serialize for Metainfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Metainfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
