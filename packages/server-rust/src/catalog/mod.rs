//! Engine catalog: authoritative mapping from engine identity to descriptor.
//!
//! Reads go through an [`ArcSwap`] snapshot and never block. Administrative
//! writes are serialized per engine name, persisted to the [`EngineStore`]
//! first, and only then published with a read-copy-update swap. A writer
//! always holds the lock for the engine's current name, so renames and
//! removals of one engine never interleave.

pub mod snapshot;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use scoring_core::{
    validate_name, EnginePatch, EngineSpec, ExecutionTarget, Metainfo, ResourceLimits,
    ScoringEngine, SortDir, SortKey,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

pub use snapshot::{CatalogSnapshot, Position, Slice};

use crate::error::{ScoringError, ScoringResult};
use crate::service::registry::{ManagedService, ServiceContext};
use crate::service::ServerConfig;
use crate::storage::{decode_engine, encode_engine, EngineStore};

/// Registry of scoring engines.
pub struct Catalog {
    snapshot: ArcSwap<CatalogSnapshot>,
    store: Arc<dyn EngineStore>,
    config: Arc<ServerConfig>,
    /// Per-name write locks. Entries are dropped once nobody holds them.
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Catalog {
    /// Creates an empty catalog over `store`. Call [`Catalog::load`] (or
    /// initialize the catalog through the service registry) to populate it.
    #[must_use]
    pub fn new(store: Arc<dyn EngineStore>, config: Arc<ServerConfig>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(CatalogSnapshot::default()),
            store,
            config,
            write_locks: DashMap::new(),
        }
    }

    /// Replaces the in-memory snapshot with the contents of the backing store.
    ///
    /// Records that fail to decode, or that collide on uuid or name with an
    /// earlier record, are skipped with a warning. Returns the number of
    /// engines loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let records = self.store.load_all().await?;
        let mut engines = Vec::with_capacity(records.len());
        for (key, bytes) in records {
            match decode_engine(&bytes) {
                Ok(engine) if engine.uuid.to_string() == key => engines.push(engine),
                Ok(engine) => {
                    warn!(key = %key, uuid = %engine.uuid, "skipping engine stored under a foreign key");
                }
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable engine record"),
            }
        }
        // Oldest registration wins a name collision.
        engines.sort_by_key(|e| (e.created_at, e.uuid));

        let (snapshot, rejected) = CatalogSnapshot::from_engines(engines);
        for engine in rejected {
            warn!(uuid = %engine.uuid, name = %engine.name, "skipping engine with duplicate identity");
        }
        let count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        info!(count, "catalog loaded");
        Ok(count)
    }

    /// Current point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }

    /// Resolves `ident` as a uuid, then as a name.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] if no engine matches.
    pub fn get(&self, ident: &str) -> ScoringResult<Arc<ScoringEngine>> {
        self.snapshot
            .load()
            .get(ident)
            .ok_or_else(|| ScoringError::not_found(ident))
    }

    /// Lists engines ordered by `sort_key` (default `uuid`) in `sort_dir`
    /// (default `asc`), ties broken by uuid ascending.
    ///
    /// `limit` of `None` or zero uses the configured default page size;
    /// larger values are clamped to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidArgument`] for an unknown sort key or
    /// direction or a negative limit. Validation happens before any lookup.
    pub fn list(
        &self,
        sort_key: Option<&str>,
        sort_dir: Option<&str>,
        limit: Option<i64>,
    ) -> ScoringResult<Vec<Arc<ScoringEngine>>> {
        let key = parse_sort_key(sort_key)?;
        let dir = parse_sort_dir(sort_dir)?;
        let limit = self.page_limit(limit)?;
        Ok(self.snapshot.load().slice(key, dir, limit, None).engines)
    }

    /// Resolves a caller-supplied page size against the configured bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidArgument`] if `limit` is negative.
    pub fn page_limit(&self, limit: Option<i64>) -> ScoringResult<usize> {
        match limit {
            None | Some(0) => Ok(self.config.default_page_limit),
            Some(n) if n < 0 => Err(ScoringError::InvalidArgument(format!(
                "limit must be non-negative, got {n}"
            ))),
            Some(n) => Ok(usize::try_from(n)
                .unwrap_or(usize::MAX)
                .min(self.config.max_page_limit)),
        }
    }

    /// Registers a new engine.
    ///
    /// # Errors
    ///
    /// - [`ScoringError::InvalidArgument`] for an unusable name, target, or limit
    /// - [`ScoringError::MalformedMetainfo`] for an invalid descriptor
    /// - [`ScoringError::Conflict`] if the name is taken
    /// - [`ScoringError::Internal`] if the backing store write fails
    pub async fn register(&self, spec: EngineSpec) -> ScoringResult<Arc<ScoringEngine>> {
        validate_name(&spec.name).map_err(|e| ScoringError::InvalidArgument(e.to_string()))?;
        let metainfo = parse_metainfo(&spec.name, spec.metainfo)?;
        validate_execution(&spec.target, &spec.limits)?;

        let _guard = self.lock_names(&[&spec.name]).await;
        if self.snapshot.load().name_owner(&spec.name).is_some() {
            return Err(ScoringError::Conflict { name: spec.name });
        }

        let now = now_millis();
        let engine = ScoringEngine {
            uuid: Uuid::new_v4(),
            name: spec.name,
            description: spec.description,
            metainfo,
            target: spec.target,
            limits: spec.limits,
            created_at: now,
            updated_at: now,
        };
        let engine = self.persist_and_publish(engine).await?;
        info!(uuid = %engine.uuid, name = %engine.name, target = engine.target.kind(), "scoring engine registered");
        Ok(engine)
    }

    /// Applies an administrative update to name, description, or metainfo.
    ///
    /// # Errors
    ///
    /// Same as [`Catalog::register`], plus [`ScoringError::NotFound`].
    pub async fn update(
        &self,
        ident: &str,
        patch: EnginePatch,
    ) -> ScoringResult<Arc<ScoringEngine>> {
        if let Some(name) = &patch.name {
            validate_name(name).map_err(|e| ScoringError::InvalidArgument(e.to_string()))?;
        }
        let (_guard, current, new_name) = loop {
            let current = self.get(ident)?;
            let new_name = patch.name.clone().unwrap_or_else(|| current.name.clone());
            let guard = self.lock_names(&[&current.name, &new_name]).await;
            // Re-read under the lock: the engine may have been renamed or removed
            // while we waited, in which case the locks held are the wrong ones.
            if let Some(locked) = self.locked_engine(&current) {
                break (guard, locked, new_name);
            }
        };
        let metainfo = match patch.metainfo {
            Some(raw) => Some(parse_metainfo(&new_name, raw)?),
            None => None,
        };
        if let Some(owner) = self.snapshot.load().name_owner(&new_name) {
            if owner != current.uuid {
                return Err(ScoringError::Conflict { name: new_name });
            }
        }

        let mut engine = (*current).clone();
        engine.name = new_name;
        if let Some(description) = patch.description {
            engine.description = description;
        }
        if let Some(metainfo) = metainfo {
            engine.metainfo = metainfo;
        }
        engine.updated_at = now_millis().max(current.updated_at);

        let engine = self.persist_and_publish(engine).await?;
        info!(uuid = %engine.uuid, name = %engine.name, "scoring engine updated");
        Ok(engine)
    }

    /// Removes an engine. In-flight invocations keep their own reference and
    /// finish; later lookups fail with `NotFound`.
    ///
    /// # Errors
    ///
    /// [`ScoringError::NotFound`] if no engine matches; [`ScoringError::Internal`]
    /// if the backing store delete fails.
    pub async fn deregister(&self, ident: &str) -> ScoringResult<Arc<ScoringEngine>> {
        let (_guard, removed) = loop {
            let current = self.get(ident)?;
            let guard = self.lock_names(&[&current.name]).await;
            if let Some(locked) = self.locked_engine(&current) {
                break (guard, locked);
            }
        };

        self.store.delete(&removed.uuid.to_string()).await?;
        self.snapshot.rcu(|snap| snap.without(&removed.uuid));
        info!(uuid = %removed.uuid, name = %removed.name, "scoring engine deregistered");
        Ok(removed)
    }

    /// Returns the published entry for `seen` if it still exists under the
    /// same name. Callers hold the lock for `seen.name`; a rename or removal
    /// since then means that lock no longer guards the engine.
    fn locked_engine(&self, seen: &ScoringEngine) -> Option<Arc<ScoringEngine>> {
        self.snapshot
            .load()
            .get_by_uuid(&seen.uuid)
            .filter(|now| now.name == seen.name)
    }

    async fn persist_and_publish(
        &self,
        engine: ScoringEngine,
    ) -> ScoringResult<Arc<ScoringEngine>> {
        let bytes = encode_engine(&engine)?;
        self.store.store(&engine.uuid.to_string(), &bytes).await?;
        let engine = Arc::new(engine);
        self.snapshot
            .rcu(|snap| snap.with_engine(Arc::clone(&engine)));
        Ok(engine)
    }

    /// Acquires the write locks for `names` in a fixed order.
    async fn lock_names(&self, names: &[&str]) -> NameLocks<'_> {
        let mut sorted: Vec<String> = names.iter().map(|n| (*n).to_string()).collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for name in sorted {
            let lock = Arc::clone(self.write_locks.entry(name.clone()).or_default().value());
            guards.push((name, lock.lock_owned().await));
        }
        NameLocks {
            locks: &self.write_locks,
            guards,
        }
    }
}

/// Held write locks; releases them and prunes unused entries on drop.
struct NameLocks<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    guards: Vec<(String, OwnedMutexGuard<()>)>,
}

impl Drop for NameLocks<'_> {
    fn drop(&mut self) {
        for (name, guard) in self.guards.drain(..) {
            drop(guard);
            self.locks
                .remove_if(&name, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[async_trait]
impl ManagedService for Catalog {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.store.initialize().await?;
        self.load().await?;
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        self.load().await.map(|_| ())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.store.close().await
    }
}

fn parse_sort_key(raw: Option<&str>) -> ScoringResult<SortKey> {
    raw.map_or(Ok(SortKey::default()), str::parse::<SortKey>)
        .map_err(|e| ScoringError::InvalidArgument(e.to_string()))
}

fn parse_sort_dir(raw: Option<&str>) -> ScoringResult<SortDir> {
    raw.map_or(Ok(SortDir::default()), str::parse::<SortDir>)
        .map_err(|e| ScoringError::InvalidArgument(e.to_string()))
}

pub(crate) fn parse_sort(
    sort_key: Option<&str>,
    sort_dir: Option<&str>,
) -> ScoringResult<(SortKey, SortDir)> {
    Ok((parse_sort_key(sort_key)?, parse_sort_dir(sort_dir)?))
}

fn parse_metainfo(name: &str, raw: Option<String>) -> ScoringResult<Option<Metainfo>> {
    Metainfo::parse_optional(raw).map_err(|e| ScoringError::MalformedMetainfo {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn validate_execution(target: &ExecutionTarget, limits: &ResourceLimits) -> ScoringResult<()> {
    let invalid = |message: String| Err(ScoringError::InvalidArgument(message));
    match target {
        ExecutionTarget::Builtin { function } if function.is_empty() => {
            return invalid("builtin function name must not be empty".to_string());
        }
        ExecutionTarget::Process { program, .. } if program.is_empty() => {
            return invalid("process program must not be empty".to_string());
        }
        ExecutionTarget::Http { url } => match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return invalid(format!("engine url must be an absolute http(s) URL: {url}")),
        },
        _ => {}
    }
    if limits.timeout_ms == Some(0) {
        return invalid("limits.timeout_ms must be positive".to_string());
    }
    if limits.max_output_bytes == Some(0) {
        return invalid("limits.max_output_bytes must be positive".to_string());
    }
    if limits.max_concurrency == Some(0) {
        return invalid("limits.max_concurrency must be positive".to_string());
    }
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::storage::stores::MemoryStore;

    fn builtin_spec(name: &str) -> EngineSpec {
        EngineSpec {
            name: name.to_string(),
            description: None,
            metainfo: None,
            target: ExecutionTarget::Builtin {
                function: "weighted_utilization".into(),
            },
            limits: ResourceLimits::default(),
        }
    }

    fn catalog_with(store: Arc<MemoryStore>) -> Catalog {
        Catalog::new(store, Arc::new(ServerConfig::default()))
    }

    fn catalog() -> Catalog {
        catalog_with(Arc::new(MemoryStore::new()))
    }

    fn names(engines: &[Arc<ScoringEngine>]) -> Vec<&str> {
        engines.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn get_by_uuid_and_by_name_return_same_descriptor() {
        let catalog = catalog();
        let engine = catalog.register(builtin_spec("power-score")).await.unwrap();

        let by_uuid = catalog.get(&engine.uuid.to_string()).unwrap();
        let by_name = catalog.get("power-score").unwrap();
        assert_eq!(by_uuid, by_name);
        assert_eq!(*by_uuid, *engine);
    }

    #[tokio::test]
    async fn get_unknown_ident_is_not_found() {
        let catalog = catalog();
        let err = catalog.get("does-not-exist").unwrap_err();
        assert!(matches!(err, ScoringError::NotFound { ident } if ident == "does-not-exist"));
    }

    #[tokio::test]
    async fn register_rejects_unusable_targets_and_limits() {
        let catalog = catalog();
        let bad = [
            EngineSpec {
                target: ExecutionTarget::Http {
                    url: "ftp://scorer".into(),
                },
                ..builtin_spec("bad-url")
            },
            EngineSpec {
                target: ExecutionTarget::Process {
                    program: String::new(),
                    args: Vec::new(),
                    env: std::collections::BTreeMap::new(),
                },
                ..builtin_spec("no-program")
            },
            EngineSpec {
                limits: ResourceLimits {
                    timeout_ms: Some(0),
                    ..ResourceLimits::default()
                },
                ..builtin_spec("zero-timeout")
            },
            EngineSpec {
                limits: ResourceLimits {
                    max_concurrency: Some(0),
                    ..ResourceLimits::default()
                },
                ..builtin_spec("zero-concurrency")
            },
        ];
        for spec in bad {
            let name = spec.name.clone();
            let err = catalog.register(spec).await.unwrap_err();
            assert!(matches!(err, ScoringError::InvalidArgument(_)), "{name}");
        }
        assert!(catalog.snapshot().is_empty());
    }

    #[tokio::test]
    async fn list_by_name_ascending() {
        let catalog = catalog();
        catalog.register(builtin_spec("power-score")).await.unwrap();
        catalog.register(builtin_spec("load-score")).await.unwrap();

        let listed = catalog.list(Some("name"), Some("asc"), Some(10)).unwrap();
        assert_eq!(names(&listed), ["load-score", "power-score"]);

        let listed = catalog.list(Some("name"), Some("desc"), None).unwrap();
        assert_eq!(names(&listed), ["power-score", "load-score"]);
    }

    #[tokio::test]
    async fn list_rejects_bad_parameters() {
        let catalog = catalog();
        catalog.register(builtin_spec("power-score")).await.unwrap();

        for key in ["metainfo", "NAME", "", "uuid;drop"] {
            let err = catalog.list(Some(key), None, None).unwrap_err();
            assert!(matches!(err, ScoringError::InvalidArgument(_)), "{key}");
        }
        let err = catalog.list(None, Some("sideways"), None).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidArgument(_)));
        let err = catalog.list(None, None, Some(-1)).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn list_limit_defaults_and_clamps() {
        let config = ServerConfig {
            default_page_limit: 2,
            max_page_limit: 3,
            ..ServerConfig::default()
        };
        let catalog = Catalog::new(Arc::new(MemoryStore::new()), Arc::new(config));
        for name in ["a", "b", "c", "d"] {
            catalog.register(builtin_spec(name)).await.unwrap();
        }

        assert_eq!(catalog.list(None, None, None).unwrap().len(), 2);
        assert_eq!(catalog.list(None, None, Some(0)).unwrap().len(), 2);
        assert_eq!(catalog.list(None, None, Some(1)).unwrap().len(), 1);
        assert_eq!(catalog.list(None, None, Some(100)).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_until_removed() {
        let catalog = catalog();
        let first = catalog.register(builtin_spec("power-score")).await.unwrap();

        let err = catalog.register(builtin_spec("power-score")).await.unwrap_err();
        assert!(matches!(err, ScoringError::Conflict { .. }));

        catalog.deregister("power-score").await.unwrap();
        let second = catalog.register(builtin_spec("power-score")).await.unwrap();
        assert_ne!(first.uuid, second.uuid);
    }

    #[tokio::test]
    async fn register_validates_name_and_metainfo() {
        let catalog = catalog();

        let err = catalog.register(builtin_spec("bad name")).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidArgument(_)));

        let mut spec = builtin_spec("meta");
        spec.metainfo = Some("{not json".into());
        let err = catalog.register(spec).await.unwrap_err();
        assert!(matches!(err, ScoringError::MalformedMetainfo { .. }));
        assert!(catalog.snapshot().is_empty());
    }

    #[tokio::test]
    async fn metainfo_is_returned_verbatim() {
        let catalog = catalog();
        let raw = "{\"output\": {\"type\": \"number\"},   \"version\": 2}";
        let mut spec = builtin_spec("meta");
        spec.metainfo = Some(raw.into());
        catalog.register(spec).await.unwrap();

        let engine = catalog.get("meta").unwrap();
        assert_eq!(engine.metainfo.as_ref().unwrap().as_str(), raw);
    }

    #[tokio::test]
    async fn update_renames_and_clears_description() {
        let catalog = catalog();
        let mut spec = builtin_spec("old-name");
        spec.description = Some("text".into());
        let engine = catalog.register(spec).await.unwrap();

        let patch = EnginePatch {
            name: Some("new-name".into()),
            description: Some(None),
            metainfo: None,
        };
        let updated = catalog.update("old-name", patch).await.unwrap();
        assert_eq!(updated.uuid, engine.uuid);
        assert_eq!(updated.name, "new-name");
        assert!(updated.description.is_none());
        assert!(catalog.get("old-name").is_err());
        assert_eq!(catalog.get("new-name").unwrap().uuid, engine.uuid);
    }

    #[tokio::test]
    async fn update_to_taken_name_conflicts() {
        let catalog = catalog();
        catalog.register(builtin_spec("a")).await.unwrap();
        catalog.register(builtin_spec("b")).await.unwrap();

        let patch = EnginePatch {
            name: Some("b".into()),
            ..EnginePatch::default()
        };
        let err = catalog.update("a", patch).await.unwrap_err();
        assert!(matches!(err, ScoringError::Conflict { .. }));
    }

    #[tokio::test]
    async fn registrations_are_persisted_and_reloaded() {
        let store = Arc::new(MemoryStore::new());
        let catalog = catalog_with(Arc::clone(&store));
        let kept = catalog.register(builtin_spec("kept")).await.unwrap();
        catalog.register(builtin_spec("dropped")).await.unwrap();
        catalog.deregister("dropped").await.unwrap();
        assert_eq!(store.len(), 1);

        let reloaded = catalog_with(store);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(*reloaded.get("kept").unwrap(), *kept);
    }

    #[tokio::test]
    async fn load_skips_corrupt_records() {
        let store = Arc::new(MemoryStore::new());
        store.store("garbage", &[0xc1]).await.unwrap();
        let catalog = catalog_with(Arc::clone(&store));
        catalog.register(builtin_spec("good")).await.unwrap();

        let reloaded = catalog_with(store);
        assert_eq!(reloaded.load().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn held_snapshot_is_unaffected_by_deregistration() {
        let catalog = catalog();
        catalog.register(builtin_spec("e1")).await.unwrap();

        let snapshot = catalog.snapshot();
        catalog.deregister("e1").await.unwrap();

        assert!(snapshot.get("e1").is_some());
        assert!(catalog.get("e1").is_err());
    }

    #[tokio::test]
    async fn concurrent_registrations_of_one_name_admit_exactly_one() {
        let catalog = Arc::new(catalog());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let catalog = Arc::clone(&catalog);
            handles.push(tokio::spawn(async move {
                catalog.register(builtin_spec("contended")).await.is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(catalog.snapshot().len(), 1);
        assert!(catalog.write_locks.is_empty());
    }

    /// Memory store whose writes take a while, to widen race windows.
    struct SlowStore {
        inner: Arc<MemoryStore>,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl EngineStore for SlowStore {
        async fn initialize(&self) -> anyhow::Result<()> {
            self.inner.initialize().await
        }

        async fn load_all(&self) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
            self.inner.load_all().await
        }

        async fn store(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.store(key, value).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn stale_rename_cannot_revive_a_deregistered_engine() {
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let slow = Arc::new(SlowStore {
            inner: Arc::clone(&store),
            delay: Duration::from_millis(200),
        });
        let catalog = Arc::new(Catalog::new(slow, Arc::new(ServerConfig::default())));
        catalog.register(builtin_spec("x")).await.unwrap();

        let rename = |to: &str| {
            let catalog = Arc::clone(&catalog);
            let patch = EnginePatch {
                name: Some(to.to_string()),
                ..EnginePatch::default()
            };
            tokio::spawn(async move { catalog.update("x", patch).await })
        };
        let to_y = rename("y");
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Resolves "x" now, then waits behind the first rename's locks.
        let to_z = rename("z");
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(to_y.await.unwrap().unwrap().name, "y");
        catalog.deregister("y").await.unwrap();

        let err = to_z.await.unwrap().unwrap_err();
        assert!(matches!(err, ScoringError::NotFound { .. }), "{err:?}");
        assert!(catalog.get("z").is_err());
        assert!(catalog.snapshot().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deregister_follows_a_rename_that_won_the_lock() {
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let slow = Arc::new(SlowStore {
            inner: Arc::clone(&store),
            delay: Duration::from_millis(100),
        });
        let catalog = Arc::new(Catalog::new(slow, Arc::new(ServerConfig::default())));
        let engine = catalog.register(builtin_spec("x")).await.unwrap();

        let renamer = Arc::clone(&catalog);
        let rename = tokio::spawn(async move {
            let patch = EnginePatch {
                name: Some("y".into()),
                ..EnginePatch::default()
            };
            renamer.update("x", patch).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Resolves "x" by name, waits on its lock, then finds it renamed.
        let err = catalog.deregister("x").await.unwrap_err();
        assert!(matches!(err, ScoringError::NotFound { .. }));
        rename.await.unwrap().unwrap();

        // By uuid the engine is still reachable and removal works.
        catalog.deregister(&engine.uuid.to_string()).await.unwrap();
        assert!(catalog.snapshot().is_empty());
        assert!(store.is_empty());
    }

    proptest! {
        #[test]
        fn list_is_idempotent_and_consistent_with_get(
            names in proptest::collection::hash_set("[a-z]{1,6}", 1..12),
            key_idx in 0usize..5,
            desc in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let catalog = catalog();
                for name in &names {
                    catalog.register(builtin_spec(name)).await.unwrap();
                }
                let key = SortKey::ALL[key_idx].as_str();
                let dir = if desc { "desc" } else { "asc" };

                let first = catalog.list(Some(key), Some(dir), Some(1000)).unwrap();
                let second = catalog.list(Some(key), Some(dir), Some(1000)).unwrap();
                prop_assert_eq!(first.len(), names.len());
                prop_assert_eq!(&first, &second);

                for engine in &first {
                    let by_uuid = catalog.get(&engine.uuid.to_string()).unwrap();
                    let by_name = catalog.get(&engine.name).unwrap();
                    prop_assert_eq!(&by_uuid, &by_name);
                }
                Ok(())
            })?;
        }
    }
}
