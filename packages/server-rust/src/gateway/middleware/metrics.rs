//! Metrics middleware for invocations.
//!
//! Wraps each invocation in a `tracing` span and records its duration and
//! outcome both as a log event and through the `metrics` facade
//! (`scoring_invocations_total`, `scoring_invocation_duration_seconds`).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments invocations with timing and outcome.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
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
        let call_id = inv.call_id;
        let engine = inv.engine_name().to_string();
        let kind = inv.engine.target.kind();

        let span = info_span!(
            "invocation",
            call_id = call_id,
            engine = %engine,
            kind = kind,
            timeout_ms = inv.timeout_ms(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(inv);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    "scoring_invocations_total",
                    "engine" => engine.clone(),
                    "outcome" => outcome,
                )
                .increment(1);
                metrics::histogram!("scoring_invocation_duration_seconds", "engine" => engine)
                    .record(elapsed.as_secs_f64());

                match &result {
                    Ok(_) => tracing::info!(duration_ms, outcome, "invocation complete"),
                    Err(e) => tracing::warn!(duration_ms, outcome, error = %e, "invocation failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
