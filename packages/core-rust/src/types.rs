use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metainfo::Metainfo;

/// A registered scoring engine: identity, descriptor, and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringEngine {
    /// Assigned at creation, never changes.
    pub uuid: Uuid,
    /// Unique among currently registered engines.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metainfo: Option<Metainfo>,
    pub target: ExecutionTarget,
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

/// How an engine is executed. Selected once at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// In-process function looked up by name in the gateway's builtin table.
    Builtin { function: String },
    /// External executable. Receives the input as JSON on stdin and writes
    /// its output as JSON to stdout.
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Network endpoint receiving the input as a JSON `POST` body.
    Http { url: String },
}

impl ExecutionTarget {
    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Builtin { .. } => "builtin",
            Self::Process { .. } => "process",
            Self::Http { .. } => "http",
        }
    }
}

/// Per-engine resource caps. Unset fields fall back to gateway defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

/// Administrative registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Raw metainfo document; validated on registration.
    #[serde(default)]
    pub metainfo: Option<String>,
    pub target: ExecutionTarget,
    #[serde(default)]
    pub limits: ResourceLimits,
}

/// Administrative update. `None` leaves a field untouched; for the optional
/// fields `Some(None)` clears them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub metainfo: Option<Option<String>>,
}

/// Why an engine name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("engine name must be 1-255 characters of [A-Za-z0-9_.-] starting with an alphanumeric: {0:?}")]
    Invalid(String),
    #[error("engine name must not be a UUID: {0}")]
    LooksLikeUuid(String),
}

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,254}$").expect("static regex is valid")
});

/// Checks that `name` can be used as an engine identity.
///
/// Names that parse as a UUID are refused so that identity resolution
/// (UUID first, then name) never has two answers.
///
/// # Errors
///
/// Returns [`NameError`] describing the violated rule.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if !NAME_RE.is_match(name) {
        return Err(NameError::Invalid(name.to_string()));
    }
    if Uuid::parse_str(name).is_ok() {
        return Err(NameError::LooksLikeUuid(name.to_string()));
    }
    Ok(())
}

/// Serde helper distinguishing an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option, clippy::option_option)]
    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    #[allow(clippy::option_option)]
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
