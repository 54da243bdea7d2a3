//! Pipeline composition: combines all middleware layers into a single service stack.

use serde_json::Value;
use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::error::ScoringError;
use crate::gateway::executor::ExecuteService;
use crate::gateway::invocation::Invocation;
use crate::service::config::ServerConfig;

/// The boxed invocation pipeline held by the gateway.
pub type InvocationPipeline = BoxCloneService<Invocation, Value, ScoringError>;

/// Build the invocation pipeline by wrapping the `ExecuteService` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome, including rejections and timeouts
/// 2. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 3. `TimeoutLayer` -- enforce the invocation's effective timeout
#[must_use]
pub fn build_invocation_pipeline(
    execute: ExecuteService,
    config: &ServerConfig,
) -> InvocationPipeline {
    let svc = ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_invocations))
        .layer(TimeoutLayer)
        .service(execute);
    BoxCloneService::new(svc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
