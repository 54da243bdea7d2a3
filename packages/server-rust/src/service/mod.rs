//! Service configuration and lifecycle management.
//!
//! - [`config`]: Server-level limits and defaults
//! - [`registry`]: `ManagedService` trait and the registry that drives init/shutdown

pub mod config;
pub mod registry;

pub use config::ServerConfig;
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
