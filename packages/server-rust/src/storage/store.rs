//! Key-value contract for the external datastore holding engine registrations.
//!
//! The catalog is the only writer. It encodes each [`ScoringEngine`] with
//! [`encode_engine`] and keys it by UUID; implementations only move opaque
//! bytes around.

use async_trait::async_trait;
use scoring_core::ScoringEngine;

/// Persistent backing store for catalog entries.
///
/// Used as `Arc<dyn EngineStore>`. Implementations: in-memory and embedded
/// redb.
#[async_trait]
pub trait EngineStore: Send + Sync {
    /// One-time initialization (e.g., create tables).
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Load every stored record as `(key, bytes)`.
    async fn load_all(&self) -> anyhow::Result<Vec<(String, Vec<u8>)>>;

    /// Insert or replace a record.
    async fn store(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Delete a record. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Release resources.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Serializes an engine to the stored `MsgPack` representation.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_engine(engine: &ScoringEngine) -> anyhow::Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(engine)?)
}

/// Deserializes an engine from its stored representation.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid engine record, including
/// a stored metainfo document that no longer validates.
pub fn decode_engine(bytes: &[u8]) -> anyhow::Result<ScoringEngine> {
    Ok(rmp_serde::from_slice(bytes)?)
}
