//! Execution targets and the dispatch service at the bottom of the pipeline.
//!
//! Each [`ExecutionTarget`] variant has one [`Executor`]. [`ExecuteService`]
//! picks the executor for the invocation's engine, runs it on its own task
//! so a panic or crash stays contained, and applies the output contract.

pub mod builtin;
pub mod http;
pub mod process;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use scoring_core::ExecutionTarget;
use serde_json::Value;
use tokio::task::JoinHandle;
use tower::Service;

pub use builtin::{BuiltinExecutor, BuiltinTable, ScoringFunction};
pub use http::HttpExecutor;
pub use process::ProcessExecutor;

use super::invocation::Invocation;
use super::output::{validate_output, RawOutput};
use crate::error::{ScoringError, ScoringResult};

/// The single "execute" capability every engine kind provides.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Runs the engine once. Must not mutate `inv.input`.
    async fn execute(&self, inv: &Invocation) -> ScoringResult<RawOutput>;
}

// ---------------------------------------------------------------------------
// ExecuteService
// ---------------------------------------------------------------------------

/// Innermost service: dispatches an [`Invocation`] to the executor matching
/// its engine's target.
#[derive(Clone)]
pub struct ExecuteService {
    builtin: Arc<dyn Executor>,
    process: Arc<dyn Executor>,
    http: Arc<dyn Executor>,
}

impl ExecuteService {
    #[must_use]
    pub fn new(
        builtin: Arc<dyn Executor>,
        process: Arc<dyn Executor>,
        http: Arc<dyn Executor>,
    ) -> Self {
        Self {
            builtin,
            process,
            http,
        }
    }

    fn executor_for(&self, target: &ExecutionTarget) -> Arc<dyn Executor> {
        match target {
            ExecutionTarget::Builtin { .. } => Arc::clone(&self.builtin),
            ExecutionTarget::Process { .. } => Arc::clone(&self.process),
            ExecutionTarget::Http { .. } => Arc::clone(&self.http),
        }
    }
}

impl Service<Invocation> for ExecuteService {
    type Response = Value;
    type Error = ScoringError;
    type Future = Pin<Box<dyn Future<Output = ScoringResult<Value>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        let executor = self.executor_for(&inv.engine.target);
        Box::pin(async move {
            let engine = inv.engine_name().to_string();
            let max_output_bytes = inv.max_output_bytes;
            let cancel = inv.cancel.clone();

            // Dropping the guard (timeout, cancellation) aborts the task, which
            // drops the executor future and with it the child process or
            // connection it owns.
            let mut task = AbortOnDrop(tokio::spawn(async move { executor.execute(&inv).await }));

            let raw = tokio::select! {
                joined = &mut task.0 => match joined {
                    Ok(result) => result?,
                    Err(e) if e.is_panic() => {
                        return Err(ScoringError::ExecutionError {
                            engine,
                            message: "engine panicked".to_string(),
                        });
                    }
                    Err(_) => return Err(ScoringError::Cancelled { engine }),
                },
                () = cancel.cancelled() => return Err(ScoringError::Cancelled { engine }),
            };

            validate_output(&engine, raw, max_output_bytes)
        })
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
