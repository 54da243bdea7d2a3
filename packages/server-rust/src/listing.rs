//! Paged, ordered views over the catalog.
//!
//! The service keeps no state between pages. A page's `next_marker` is an
//! opaque token (base64url JSON) recording the sort key and direction it was
//! cut with plus the `(sort value, uuid)` of the page's last entry; the next
//! page is everything strictly after that position in a fresh snapshot. The
//! position does not need to still exist, so deleting the last entry seen
//! does not break a walk through the listing.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use scoring_core::{ScoringEngine, SortDir, SortKey, SortValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{parse_sort, Catalog, Position};
use crate::error::{ScoringError, ScoringResult};

/// Caller-supplied listing parameters, all optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRequest {
    pub limit: Option<i64>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    pub marker: Option<String>,
}

/// One page of engines, with the resolved parameters it was cut with.
#[derive(Debug, Clone)]
pub struct Page {
    pub engines: Vec<Arc<ScoringEngine>>,
    /// Present when the page is full and more entries follow.
    pub next_marker: Option<String>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
    pub limit: usize,
}

/// Wire form of a marker.
#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    #[serde(rename = "k")]
    key: SortKey,
    #[serde(rename = "d")]
    dir: SortDir,
    #[serde(rename = "v")]
    value: SortValue,
    #[serde(rename = "u")]
    uuid: Uuid,
}

impl Cursor {
    fn encode(&self) -> ScoringResult<String> {
        let json = serde_json::to_vec(self).map_err(anyhow::Error::from)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(marker: &str) -> ScoringResult<Self> {
        let bad = || ScoringError::InvalidArgument(format!("invalid marker: {marker:?}"));
        let bytes = URL_SAFE_NO_PAD.decode(marker).map_err(|_| bad())?;
        let cursor: Self = serde_json::from_slice(&bytes).map_err(|_| bad())?;
        let value_fits_key = match (cursor.key, &cursor.value) {
            (SortKey::CreatedAt | SortKey::UpdatedAt, SortValue::Millis(_))
            | (SortKey::Description, SortValue::Text(_))
            | (SortKey::Uuid | SortKey::Name, SortValue::Text(Some(_))) => true,
            _ => false,
        };
        if value_fits_key {
            Ok(cursor)
        } else {
            Err(bad())
        }
    }
}

/// Stateless paging over a [`Catalog`].
pub struct ListingService {
    catalog: Arc<Catalog>,
}

impl ListingService {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Returns one page in the requested order.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidArgument`] for an unknown sort key or
    /// direction, a negative limit, a marker that does not decode, or a
    /// marker cut with a different sort key or direction.
    pub fn list(&self, req: &ListRequest) -> ScoringResult<Page> {
        let (key, dir) = parse_sort(req.sort_key.as_deref(), req.sort_dir.as_deref())?;
        let limit = self.catalog.page_limit(req.limit)?;
        let after = match &req.marker {
            None => None,
            Some(marker) => {
                let cursor = Cursor::decode(marker)?;
                if cursor.key != key || cursor.dir != dir {
                    return Err(ScoringError::InvalidArgument(format!(
                        "marker was issued for sort_key={} sort_dir={}, not sort_key={key} sort_dir={dir}",
                        cursor.key, cursor.dir
                    )));
                }
                Some(Position {
                    value: cursor.value,
                    uuid: cursor.uuid,
                })
            }
        };

        let slice = self.catalog.snapshot().slice(key, dir, limit, after.as_ref());
        let next_marker = match slice.engines.last() {
            Some(last) if slice.has_more => Some(
                Cursor {
                    key,
                    dir,
                    value: SortValue::of(last, key),
                    uuid: last.uuid,
                }
                .encode()?,
            ),
            _ => None,
        };
        Ok(Page {
            engines: slice.engines,
            next_marker,
            sort_key: key,
            sort_dir: dir,
            limit,
        })
    }
}
