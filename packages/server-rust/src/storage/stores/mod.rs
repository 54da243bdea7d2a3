//! [`EngineStore`](super::EngineStore) implementations.

mod memory;
#[cfg(feature = "redb")]
mod redb_store;

pub use memory::MemoryStore;
#[cfg(feature = "redb")]
pub use redb_store::RedbStore;
