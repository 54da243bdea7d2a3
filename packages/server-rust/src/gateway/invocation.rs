//! Request and response types flowing through the invocation pipeline.

use std::sync::Arc;
use std::time::Duration;

use scoring_core::ScoringEngine;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One bounded execution of an engine against caller-supplied input.
///
/// Owns an `Arc` of the catalog entry it resolved, so a concurrent
/// deregistration does not affect it.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Unique per gateway, for log correlation.
    pub call_id: u64,
    pub engine: Arc<ScoringEngine>,
    /// Forwarded to the engine unmodified.
    pub input: Arc<Value>,
    /// Effective bound after applying engine and gateway caps.
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// Fires when the gateway shuts down.
    pub cancel: CancellationToken,
}

impl Invocation {
    /// Engine name used in errors and logs.
    #[must_use]
    pub fn engine_name(&self) -> &str {
        &self.engine.name
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A validated engine result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub engine_uuid: Uuid,
    pub engine_name: String,
    pub output: Value,
}
