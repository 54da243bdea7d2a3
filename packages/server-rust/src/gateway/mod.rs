//! Invocation gateway: resolves an engine, bounds the call, and runs it
//! through the middleware pipeline.
//!
//! The gateway never holds a catalog lock while an engine runs. Each call
//! resolves the engine once into an `Arc` and owns it until the call ends,
//! so a deregistration racing with an in-flight call lets that call finish
//! while every later call sees `NotFound`.

pub mod executor;
pub mod invocation;
pub mod middleware;
pub mod output;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scoring_core::ScoringEngine;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::debug;

pub use executor::{BuiltinTable, ExecuteService, Executor, ScoringFunction};
pub use invocation::{Invocation, Score};

use crate::catalog::Catalog;
use crate::error::{ScoringError, ScoringResult};
use crate::service::registry::{ManagedService, ServiceContext};
use crate::service::ServerConfig;
use executor::{BuiltinExecutor, HttpExecutor, ProcessExecutor};
use middleware::{build_invocation_pipeline, InvocationPipeline};

/// Entry point for running scoring engines.
pub struct InvocationGateway {
    catalog: Arc<Catalog>,
    config: Arc<ServerConfig>,
    /// `BoxCloneService` is `Send` but not `Sync`; each call clones it out.
    pipeline: Mutex<InvocationPipeline>,
    next_call_id: AtomicU64,
    /// Parent of every invocation's cancellation token.
    shutdown: CancellationToken,
}

impl InvocationGateway {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: Arc<ServerConfig>, execute: ExecuteService) -> Self {
        let pipeline = build_invocation_pipeline(execute, &config);
        Self {
            catalog,
            config,
            pipeline: Mutex::new(pipeline),
            next_call_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Gateway with the shipped builtins and the process and HTTP executors.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_default_executors(
        catalog: Arc<Catalog>,
        config: Arc<ServerConfig>,
    ) -> anyhow::Result<Self> {
        let execute = ExecuteService::new(
            Arc::new(BuiltinExecutor::new(BuiltinTable::with_defaults())),
            Arc::new(ProcessExecutor::new(&config)),
            Arc::new(HttpExecutor::new(&config)?),
        );
        Ok(Self::new(catalog, config, execute))
    }

    /// Runs the engine identified by `ident` (uuid or name) once against
    /// `input` and returns its validated output.
    ///
    /// # Errors
    ///
    /// - [`ScoringError::NotFound`] if no engine matches `ident`
    /// - [`ScoringError::InvalidArgument`] for a zero `timeout`
    /// - [`ScoringError::Timeout`] if the engine does not finish in time
    /// - [`ScoringError::InvalidOutput`] or [`ScoringError::ExecutionError`]
    ///   when the engine misbehaves
    /// - [`ScoringError::Overloaded`] when a concurrency limit is reached
    /// - [`ScoringError::Cancelled`] if the gateway is shutting down
    pub async fn invoke(
        &self,
        ident: &str,
        input: Value,
        timeout: Option<Duration>,
    ) -> ScoringResult<Score> {
        self.invoke_with_cancel(ident, input, timeout, CancellationToken::new())
            .await
    }

    /// Like [`InvocationGateway::invoke`], but abandons the call with
    /// [`ScoringError::Cancelled`] as soon as `cancel` fires. Any engine work
    /// already started is torn down.
    ///
    /// # Errors
    ///
    /// See [`InvocationGateway::invoke`].
    pub async fn invoke_with_cancel(
        &self,
        ident: &str,
        input: Value,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> ScoringResult<Score> {
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(ScoringError::InvalidArgument(
                "timeout must be positive".to_string(),
            ));
        }
        let engine = self.catalog.get(ident)?;
        if self.shutdown.is_cancelled() {
            return Err(ScoringError::Cancelled {
                engine: engine.name.clone(),
            });
        }

        let inv = Invocation {
            call_id: self.next_call_id.fetch_add(1, Ordering::Relaxed),
            timeout: self.effective_timeout(&engine, timeout),
            max_output_bytes: engine
                .limits
                .max_output_bytes
                .map_or(self.config.max_output_bytes, |n| n.min(self.config.max_output_bytes)),
            cancel: self.shutdown.child_token(),
            input: Arc::new(input),
            engine: Arc::clone(&engine),
        };
        debug!(
            call_id = inv.call_id,
            engine = %engine.name,
            timeout_ms = inv.timeout_ms(),
            "dispatching invocation"
        );

        let pipeline = self.pipeline.lock().clone();
        let output = tokio::select! {
            result = pipeline.oneshot(inv) => result?,
            () = cancel.cancelled() => {
                return Err(ScoringError::Cancelled { engine: engine.name.clone() });
            }
        };

        Ok(Score {
            engine_uuid: engine.uuid,
            engine_name: engine.name.clone(),
            output,
        })
    }

    /// min(requested or default, engine limit, gateway maximum).
    fn effective_timeout(&self, engine: &ScoringEngine, requested: Option<Duration>) -> Duration {
        let mut timeout = requested.unwrap_or(self.config.default_invoke_timeout);
        if let Some(ms) = engine.limits.timeout_ms {
            timeout = timeout.min(Duration::from_millis(ms));
        }
        timeout.min(self.config.max_invoke_timeout)
    }
}

#[async_trait]
impl ManagedService for InvocationGateway {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn reset(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cancels every in-flight invocation and refuses new ones.
    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.shutdown.cancel();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
