//! Load-shedding middleware for invocations.
//!
//! Two limits apply: a gateway-wide cap on invocations in flight, and an
//! optional per-engine cap from the engine's `max_concurrency`. Either one
//! being exhausted rejects the call immediately with
//! `ScoringError::Overloaded` rather than queueing it. Per-engine semaphores
//! exist only while the engine has calls in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent invocations via semaphores.
///
/// Clones share the same semaphores, so every clone of a built pipeline
/// counts against one set of limits.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    global: Arc<Semaphore>,
    per_engine: Arc<DashMap<Uuid, Arc<Semaphore>>>,
}

impl LoadShedLayer {
    /// Create a new `LoadShedLayer` with the given gateway-wide limit.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent as usize)),
            per_engine: Arc::new(DashMap::new()),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            global: Arc::clone(&self.global),
            per_engine: Arc::clone(&self.per_engine),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    global: Arc<Semaphore>,
    per_engine: Arc<DashMap<Uuid, Arc<Semaphore>>>,
}

impl<S> LoadShedService<S> {
    fn engine_semaphore(&self, inv: &Invocation) -> Option<Arc<Semaphore>> {
        let limit = inv.engine.limits.max_concurrency?;
        let semaphore = self
            .per_engine
            .entry(inv.engine.uuid)
            .or_insert_with(|| Arc::new(Semaphore::new(limit as usize)));
        Some(Arc::clone(semaphore.value()))
    }
}

/// Per-engine permit that drops the engine's semaphore once it is idle.
struct EnginePermit {
    permit: Option<OwnedSemaphorePermit>,
    engine: Uuid,
    per_engine: Arc<DashMap<Uuid, Arc<Semaphore>>>,
}

impl Drop for EnginePermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        prune_idle(&self.per_engine, &self.engine);
    }
}

/// Drops the engine's semaphore if only the map still references it.
fn prune_idle(per_engine: &DashMap<Uuid, Arc<Semaphore>>, engine: &Uuid) {
    per_engine.remove_if(engine, |_, semaphore| Arc::strong_count(semaphore) == 1);
}

impl<S> Service<Invocation> for LoadShedService<S>
where
    S: Service<Invocation, Response = Value, Error = ScoringError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = ScoringError;
    type Future = Pin<Box<dyn Future<Output = ScoringResult<Value>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        let Ok(global) = Arc::clone(&self.global).try_acquire_owned() else {
            return Box::pin(async {
                Err(ScoringError::Overloaded {
                    scope: "gateway".to_string(),
                })
            });
        };
        let engine_permit = match self.engine_semaphore(&inv) {
            None => None,
            Some(semaphore) => {
                let Ok(permit) = semaphore.try_acquire_owned() else {
                    prune_idle(&self.per_engine, &inv.engine.uuid);
                    let scope = inv.engine_name().to_string();
                    return Box::pin(async { Err(ScoringError::Overloaded { scope }) });
                };
                Some(EnginePermit {
                    permit: Some(permit),
                    engine: inv.engine.uuid,
                    per_engine: Arc::clone(&self.per_engine),
                })
            }
        };

        let fut = self.inner.call(inv);
        Box::pin(async move {
            // Permits are held until the invocation settles or is dropped.
            let result = fut.await;
            drop(engine_permit);
            drop(global);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
