//! Timeout middleware for invocations.
//!
//! Fails invocations that outlive their effective timeout with
//! `ScoringError::Timeout`. The inner future is dropped on expiry, which
//! aborts the executor task and kills any child process it owns.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tower::{Layer, Service};

use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that enforces each invocation's own `timeout`.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Invocation> for TimeoutService<S>
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
        let duration = inv.timeout;
        let timeout_ms = inv.timeout_ms();
        let engine = inv.engine_name().to_string();
        let fut = self.inner.call(inv);
        Box::pin(async move {
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ScoringError::Timeout { engine, timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
