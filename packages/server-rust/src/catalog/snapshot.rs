//! Immutable point-in-time view of the catalog.
//!
//! Readers hold an `Arc<CatalogSnapshot>` for as long as they need it.
//! Writers never touch a published snapshot: they build a modified copy and
//! swap it in, so a reader can never observe a half-applied registration.

use std::collections::HashMap;
use std::sync::Arc;

use scoring_core::{compare_engines, compare_positions, ScoringEngine, SortDir, SortKey, SortValue};
use uuid::Uuid;

/// Position in a listing order: everything strictly after it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub value: SortValue,
    pub uuid: Uuid,
}

/// One page cut from a snapshot.
#[derive(Debug, Clone)]
pub struct Slice {
    pub engines: Vec<Arc<ScoringEngine>>,
    /// Whether entries remain after the last one in `engines`.
    pub has_more: bool,
}

/// Identity indexes over the registered engines.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    by_uuid: HashMap<Uuid, Arc<ScoringEngine>>,
    by_name: HashMap<String, Uuid>,
}

impl CatalogSnapshot {
    /// Builds a snapshot from a set of engines. Later duplicates of a uuid or
    /// a name are ignored and returned so the caller can report them.
    #[must_use]
    pub fn from_engines(
        engines: impl IntoIterator<Item = ScoringEngine>,
    ) -> (Self, Vec<ScoringEngine>) {
        let mut snapshot = Self::default();
        let mut rejected = Vec::new();
        for engine in engines {
            if snapshot.by_uuid.contains_key(&engine.uuid)
                || snapshot.by_name.contains_key(&engine.name)
            {
                rejected.push(engine);
                continue;
            }
            snapshot.by_name.insert(engine.name.clone(), engine.uuid);
            snapshot.by_uuid.insert(engine.uuid, Arc::new(engine));
        }
        (snapshot, rejected)
    }

    /// Resolves `ident` as a UUID first, then as a name.
    #[must_use]
    pub fn get(&self, ident: &str) -> Option<Arc<ScoringEngine>> {
        if let Ok(uuid) = Uuid::parse_str(ident) {
            if let Some(engine) = self.by_uuid.get(&uuid) {
                return Some(Arc::clone(engine));
            }
        }
        self.by_name
            .get(ident)
            .and_then(|uuid| self.by_uuid.get(uuid))
            .map(Arc::clone)
    }

    #[must_use]
    pub fn get_by_uuid(&self, uuid: &Uuid) -> Option<Arc<ScoringEngine>> {
        self.by_uuid.get(uuid).map(Arc::clone)
    }

    /// Uuid of the engine currently holding `name`.
    #[must_use]
    pub fn name_owner(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_uuid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_uuid.is_empty()
    }

    /// All engines in listing order.
    #[must_use]
    pub fn ordered(&self, key: SortKey, dir: SortDir) -> Vec<Arc<ScoringEngine>> {
        let mut engines: Vec<_> = self.by_uuid.values().map(Arc::clone).collect();
        engines.sort_by(|a, b| compare_engines(a, b, key, dir));
        engines
    }

    /// Up to `limit` engines strictly after `after` in listing order.
    #[must_use]
    pub fn slice(
        &self,
        key: SortKey,
        dir: SortDir,
        limit: usize,
        after: Option<&Position>,
    ) -> Slice {
        let mut remaining = self.ordered(key, dir).into_iter().filter(|engine| {
            after.is_none_or(|pos| {
                let value = SortValue::of(engine, key);
                compare_positions((&value, &engine.uuid), (&pos.value, &pos.uuid), dir).is_gt()
            })
        });
        let engines: Vec<_> = remaining.by_ref().take(limit).collect();
        let has_more = remaining.next().is_some();
        Slice { engines, has_more }
    }

    /// Copy with `engine` inserted or replacing the entry with the same uuid.
    #[must_use]
    pub fn with_engine(&self, engine: Arc<ScoringEngine>) -> Self {
        let mut next = self.clone();
        if let Some(previous) = next.by_uuid.get(&engine.uuid) {
            if previous.name != engine.name {
                next.by_name.remove(&previous.name);
            }
        }
        next.by_name.insert(engine.name.clone(), engine.uuid);
        next.by_uuid.insert(engine.uuid, engine);
        next
    }

    /// Copy without the engine identified by `uuid`.
    #[must_use]
    pub fn without(&self, uuid: &Uuid) -> Self {
        let mut next = self.clone();
        if let Some(removed) = next.by_uuid.remove(uuid) {
            next.by_name.remove(&removed.name);
        }
        next
    }
}
