//! HTTP handler definitions for the REST boundary.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod engines;
pub mod error;
pub mod health;

pub use engines::{
    deregister_engine, invoke_engine, list_engines, list_engines_detail, register_engine,
    show_engine, update_engine,
};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::catalog::Catalog;
use crate::gateway::InvocationGateway;
use crate::listing::ListingService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub listing: Arc<ListingService>,
    pub gateway: Arc<InvocationGateway>,
    /// Health state and in-flight invocation tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Prefix for resource links, without a trailing slash.
    pub base_url: Arc<str>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::service::ServerConfig;
    use crate::storage::stores::MemoryStore;

    let config = Arc::new(ServerConfig::default());
    let catalog = Arc::new(Catalog::new(Arc::new(MemoryStore::new()), Arc::clone(&config)));
    let gateway = InvocationGateway::with_default_executors(Arc::clone(&catalog), config)
        .expect("gateway builds");
    AppState {
        listing: Arc::new(ListingService::new(Arc::clone(&catalog))),
        gateway: Arc::new(gateway),
        catalog,
        shutdown: Arc::new(ShutdownController::new()),
        base_url: Arc::from("http://scoring.test"),
        start_time: Instant::now(),
    }
}
