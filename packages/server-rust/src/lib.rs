//! Scoring registry server: engine catalog, paged listing, invocation
//! gateway, and the REST boundary in front of them.

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod listing;
pub mod network;
pub mod service;
pub mod storage;

pub use catalog::Catalog;
pub use error::{ScoringError, ScoringResult};
pub use gateway::{InvocationGateway, Score};
pub use listing::{ListRequest, ListingService, Page};
pub use storage::EngineStore;
