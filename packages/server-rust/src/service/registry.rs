use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::config::ServerConfig;

// ---------------------------------------------------------------------------
// ServiceContext
// ---------------------------------------------------------------------------

/// Context provided to services during initialization.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: Arc<ServerConfig>,
}

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// Lifecycle-managed component (catalog, invocation gateway).
///
/// Services are initialized in registration order and shut down in reverse
/// order, so the gateway stops invoking before the catalog closes its store.
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name of this service (e.g., `"catalog"`).
    fn name(&self) -> &'static str;

    /// Bring the service up (load state, open resources).
    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()>;

    /// Rebuild in-memory state from the authoritative source.
    async fn reset(&self) -> anyhow::Result<()>;

    /// Shut down. If `terminate` is true, skip graceful cleanup.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Holds the shared service instances and drives their lifecycle.
///
/// Services are registered as `Arc<T>` so the same instance can be handed to
/// request handlers; lookup is by name or by concrete type.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init_order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Register a shared service. Registering a second service with the same
    /// name replaces the first but keeps its position in the init order.
    pub fn register<T: ManagedService>(&self, service: Arc<T>) {
        let name = service.name();
        let replaced = self
            .by_name
            .insert(name, Arc::clone(&service) as Arc<dyn ManagedService>)
            .is_some();
        self.by_type.insert(TypeId::of::<T>(), service);
        if !replaced {
            self.init_order.write().push(name);
        }
    }

    /// Retrieve a service by its concrete type.
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve a service by its name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Initialize all registered services in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `init()` failure; later services are not initialized.
    pub async fn init_all(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        for name in &order {
            if let Some(service) = self.get_by_name(name) {
                debug!(service = name, "initializing");
                service.init(ctx).await?;
            }
        }
        Ok(())
    }

    /// Shut down all registered services in reverse registration order.
    ///
    /// Every service is asked to shut down even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown()` failure after all services ran.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let order = self.init_order.read().clone();
        let mut first_error = None;
        for name in order.iter().rev() {
            if let Some(service) = self.get_by_name(name) {
                if let Err(e) = service.shutdown(terminate).await {
                    warn!(service = name, error = %e, "shutdown failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use scoring_core::{EngineSpec, ExecutionTarget, ResourceLimits};

    use super::*;
    use crate::catalog::Catalog;
    use crate::storage::stores::MemoryStore;

    /// Records lifecycle calls into a shared log.
    struct Recorder {
        svc_name: &'static str,
        fail_shutdown: bool,
        log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &'static str, log: Arc<parking_lot::Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                svc_name: name,
                fail_shutdown: false,
                log,
            })
        }
    }

    #[async_trait]
    impl ManagedService for Recorder {
        fn name(&self) -> &'static str {
            self.svc_name
        }

        async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
            self.log.lock().push(format!("init:{}", self.svc_name));
            Ok(())
        }

        async fn reset(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            self.log.lock().push(format!("shutdown:{}", self.svc_name));
            if self.fail_shutdown {
                anyhow::bail!("{} refused to stop", self.svc_name);
            }
            Ok(())
        }
    }

    fn ctx() -> ServiceContext {
        ServiceContext {
            config: Arc::new(ServerConfig::default()),
        }
    }

    #[tokio::test]
    async fn lifecycle_runs_in_order_and_reverse() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = ServiceRegistry::new();
        registry.register(Recorder::new("first", log.clone()));
        registry.register(Recorder::new("second", log.clone()));

        registry.init_all(&ctx()).await.unwrap();
        registry.shutdown_all(false).await.unwrap();

        assert_eq!(
            log.lock().clone(),
            vec!["init:first", "init:second", "shutdown:second", "shutdown:first"]
        );
    }

    #[tokio::test]
    async fn shutdown_continues_past_failures() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = ServiceRegistry::new();
        registry.register(Recorder::new("first", log.clone()));
        registry.register(Arc::new(Recorder {
            svc_name: "broken",
            fail_shutdown: true,
            log: log.clone(),
        }));

        let err = registry.shutdown_all(false).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert_eq!(log.lock().clone(), vec!["shutdown:broken", "shutdown:first"]);
    }

    #[tokio::test]
    async fn catalog_is_loaded_on_init_and_shared_by_type() {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(ServerConfig::default());
        let seed = Catalog::new(store.clone(), config.clone());
        seed.register(EngineSpec {
            name: "power-score".into(),
            description: None,
            metainfo: None,
            target: ExecutionTarget::Builtin {
                function: "weighted_utilization".into(),
            },
            limits: ResourceLimits::default(),
        })
        .await
        .unwrap();

        let catalog = Arc::new(Catalog::new(store, config));
        let registry = ServiceRegistry::new();
        registry.register(Arc::clone(&catalog));
        registry.init_all(&ctx()).await.unwrap();

        let found = registry.get::<Catalog>().unwrap();
        assert!(Arc::ptr_eq(&found, &catalog));
        assert!(found.get("power-score").is_ok());
        assert_eq!(registry.get_by_name("catalog").unwrap().name(), "catalog");
    }

    #[test]
    fn unknown_lookups_return_none() {
        let registry = ServiceRegistry::new();
        assert!(registry.get_by_name("nonexistent").is_none());
        assert!(registry.get::<Catalog>().is_none());
    }
}
