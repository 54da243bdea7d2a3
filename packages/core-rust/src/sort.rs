//! Sort keys and the total order used for catalog listings.
//!
//! Listings are ordered by the requested [`SortKey`] in the requested
//! [`SortDir`], with ties always broken by `uuid` ascending. The same
//! comparator positions pagination cursors, so a page boundary is simply
//! "everything strictly after this `(SortValue, uuid)` pair".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ScoringEngine;

/// Fields a listing may be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Uuid,
    Name,
    Description,
    CreatedAt,
    UpdatedAt,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Uuid,
        SortKey::Name,
        SortKey::Description,
        SortKey::CreatedAt,
        SortKey::UpdatedAt,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Name => "name",
            Self::Description => "description",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a sort key or direction string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what}: {value:?} (expected one of: {expected})")]
pub struct ParseSortError {
    pub what: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl FromStr for SortKey {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ParseSortError {
                what: "sort_key",
                value: s.to_string(),
                expected: "uuid, name, description, created_at, updated_at",
            })
    }
}

/// Listing direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDir {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ParseSortError {
                what: "sort_dir",
                value: other.to_string(),
                expected: "asc, desc",
            }),
        }
    }
}

/// Value of an engine's sort field, comparable across engines.
///
/// `Text(None)` (a missing description) orders before any present text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum SortValue {
    Text(Option<String>),
    Millis(i64),
}

impl SortValue {
    /// Extracts the value of `key` from `engine`.
    #[must_use]
    pub fn of(engine: &ScoringEngine, key: SortKey) -> Self {
        match key {
            SortKey::Uuid => Self::Text(Some(engine.uuid.to_string())),
            SortKey::Name => Self::Text(Some(engine.name.clone())),
            SortKey::Description => Self::Text(engine.description.clone()),
            SortKey::CreatedAt => Self::Millis(engine.created_at),
            SortKey::UpdatedAt => Self::Millis(engine.updated_at),
        }
    }
}

/// Compares two `(value, uuid)` positions under the listing order.
///
/// The direction applies to the sort value only; the `uuid` tie-break is
/// ascending in both directions.
#[must_use]
pub fn compare_positions(
    a: (&SortValue, &Uuid),
    b: (&SortValue, &Uuid),
    dir: SortDir,
) -> Ordering {
    let primary = match dir {
        SortDir::Asc => a.0.cmp(b.0),
        SortDir::Desc => b.0.cmp(a.0),
    };
    primary.then_with(|| a.1.cmp(b.1))
}

/// Compares two engines under the listing order for `key` and `dir`.
#[must_use]
pub fn compare_engines(
    a: &ScoringEngine,
    b: &ScoringEngine,
    key: SortKey,
    dir: SortDir,
) -> Ordering {
    compare_positions(
        (&SortValue::of(a, key), &a.uuid),
        (&SortValue::of(b, key), &b.uuid),
        dir,
    )
}
