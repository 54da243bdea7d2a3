//! Tower middleware layers for the invocation pipeline.
//!
//! - [`timeout`]: Per-invocation timeout enforcement
//! - [`metrics`]: Invocation timing and outcome via `tracing` spans and `metrics`
//! - [`load_shed`]: Semaphore-based concurrency limiting, gateway-wide and per engine
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_invocation_pipeline, InvocationPipeline};
pub use timeout::TimeoutLayer;
