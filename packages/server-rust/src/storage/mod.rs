//! Persistence of engine registrations.
//!
//! - [`EngineStore`]: key-value contract to the external datastore
//! - [`stores`]: in-memory and redb implementations

pub mod store;
pub mod stores;

pub use store::*;
