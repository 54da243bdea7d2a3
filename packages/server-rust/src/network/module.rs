//! Network module with deferred startup lifecycle.
//!
//! `new()` wires shared state, `start()` binds the TCP listener, and
//! `serve()` accepts requests until the shutdown future resolves. Splitting
//! bind from serve lets the binary learn the bound port (for links and
//! logs) before traffic arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    deregister_engine, health_handler, invoke_engine, list_engines, list_engines_detail,
    liveness_handler, readiness_handler, register_engine, show_engine, update_engine, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::catalog::Catalog;
use crate::gateway::InvocationGateway;
use crate::listing::ListingService;

/// How long `serve()` waits for in-flight invocations after the listener
/// stops accepting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `GET /health`, `GET /health/live`, `GET /health/ready`
/// - `GET|POST /v1/scoring_engines`
/// - `GET /v1/scoring_engines/detail`
/// - `GET|PATCH|DELETE /v1/scoring_engines/{ident}`
/// - `POST /v1/scoring_engines/{ident}/invoke`
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/v1/scoring_engines", get(list_engines).post(register_engine))
        .route("/v1/scoring_engines/detail", get(list_engines_detail))
        .route(
            "/v1/scoring_engines/{ident}",
            get(show_engine).patch(update_engine).delete(deregister_engine),
        )
        .route("/v1/scoring_engines/{ident}/invoke", post(invoke_engine))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns the listener and the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    bound_port: u16,
    catalog: Arc<Catalog>,
    gateway: Arc<InvocationGateway>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        catalog: Arc<Catalog>,
        gateway: Arc<InvocationGateway>,
    ) -> Self {
        let bound_port = config.port;
        Self {
            config,
            listener: None,
            bound_port,
            catalog,
            gateway,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    /// Shared handle for checking health state or counting in-flight work.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Base URL used in resource links.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.config.base_url(self.bound_port)
    }

    fn state(&self) -> AppState {
        AppState {
            listing: Arc::new(ListingService::new(Arc::clone(&self.catalog))),
            catalog: Arc::clone(&self.catalog),
            gateway: Arc::clone(&self.gateway),
            shutdown: Arc::clone(&self.shutdown),
            base_url: Arc::from(self.base_url()),
            start_time: self.start_time,
        }
    }

    /// Router over this module's shared state.
    pub fn build_router(&self) -> Router {
        build_router(self.state(), &self.config)
    }

    /// Binds the TCP listener and returns the bound port, which differs from
    /// the configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "TCP listener bound");

        self.bound_port = port;
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// On the signal the health state moves to `Draining`, the listener
    /// stops accepting, open requests finish, and the state becomes
    /// `Stopped` once in-flight invocations have drained.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);

        let signal = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                info!("shutdown signal received, draining");
                controller.trigger_shutdown();
            }
        };

        controller.set_ready();
        info!(base_url = %self.base_url(), "serving scoring registry");
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("all invocations drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with invocations still running"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::HealthState;
    use crate::service::ServerConfig;
    use crate::storage::stores::MemoryStore;

    fn module(config: NetworkConfig) -> NetworkModule {
        let server_config = Arc::new(ServerConfig::default());
        let catalog = Arc::new(Catalog::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&server_config),
        ));
        let gateway = Arc::new(
            InvocationGateway::with_default_executors(Arc::clone(&catalog), server_config)
                .unwrap(),
        );
        NetworkModule::new(config, catalog, gateway)
    }

    fn local() -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".into(),
            ..NetworkConfig::default()
        }
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_before_registration() {
        use axum::body::{to_bytes, Body};
        use axum::http::{header, Request, StatusCode};
        use tower::ServiceExt;

        let state = crate::network::handlers::test_state();
        let config = NetworkConfig {
            max_body_bytes: 64,
            ..NetworkConfig::default()
        };
        let app = build_router(state.clone(), &config);
        let body = serde_json::json!({
            "name": "too-big",
            "description": "x".repeat(256),
            "target": {"type": "builtin", "function": "weighted_utilization"},
        });
        let request = Request::post("/v1/scoring_engines")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error["error"]["kind"], "invalid_argument");
        assert!(state.catalog.snapshot().is_empty());
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(NetworkConfig::default());
        assert!(module.listener.is_none());
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_and_updates_base_url() {
        let mut module = module(local());
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert_eq!(module.base_url(), format!("http://127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = module(NetworkConfig::default());
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serves_until_signalled_then_stops() {
        let mut module = module(local());
        let port = module.start().await.unwrap();
        let controller = module.shutdown_controller();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = rx.await;
        }));

        let url = format!("http://127.0.0.1:{port}/health/ready");
        let mut ready = false;
        for _ in 0..50 {
            if let Ok(resp) = reqwest::get(&url).await {
                ready = resp.status() == reqwest::StatusCode::OK;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
