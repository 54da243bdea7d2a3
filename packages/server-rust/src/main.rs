//! Scoring registry server binary.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use scoring_server::network::{NetworkConfig, NetworkModule};
use scoring_server::service::{ServerConfig, ServiceContext, ServiceRegistry};
use scoring_server::storage::stores::MemoryStore;
use scoring_server::{Catalog, EngineStore, InvocationGateway};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "scoring-server",
    about = "Registry and invocation gateway for scoring engines"
)]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "SCORING_HOST")]
    host: String,

    /// Listen port
    #[arg(long, default_value_t = 9322, env = "SCORING_PORT")]
    port: u16,

    /// Externally visible base URL used in resource links
    #[arg(long, env = "SCORING_PUBLIC_URL")]
    public_url: Option<String>,

    /// Allowed CORS origins, comma separated
    #[arg(long, value_delimiter = ',', default_value = "*", env = "SCORING_CORS_ORIGINS")]
    cors_origins: Vec<String>,

    /// redb database file; engines are kept in memory only when absent
    #[arg(long, env = "SCORING_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "SCORING_LOG_FORMAT")]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "SCORING_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Invocation timeout when the caller gives none, in seconds
    #[arg(long, default_value_t = 30, env = "SCORING_DEFAULT_TIMEOUT_SECS")]
    default_timeout_secs: u64,

    /// Hard cap on any invocation, in seconds
    #[arg(long, default_value_t = 300, env = "SCORING_MAX_TIMEOUT_SECS")]
    max_timeout_secs: u64,

    /// Invocations allowed in flight before new ones are shed
    #[arg(long, default_value_t = 256, env = "SCORING_MAX_CONCURRENT_INVOCATIONS")]
    max_concurrent_invocations: u32,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn open_store(db_path: Option<&Path>) -> anyhow::Result<Arc<dyn EngineStore>> {
    match db_path {
        None => {
            warn!("no --db-path given, registrations will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redb")]
        Some(path) => {
            let store = scoring_server::storage::stores::RedbStore::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redb"))]
        Some(_) => anyhow::bail!("--db-path requires the `redb` feature"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(port) = args.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("failed to start metrics exporter")?;
        info!(port, "metrics exporter listening");
    }

    let config = Arc::new(ServerConfig {
        default_invoke_timeout: Duration::from_secs(args.default_timeout_secs),
        max_invoke_timeout: Duration::from_secs(args.max_timeout_secs),
        max_concurrent_invocations: args.max_concurrent_invocations,
        ..ServerConfig::default()
    });
    if config.default_invoke_timeout > config.max_invoke_timeout {
        anyhow::bail!("--default-timeout-secs must not exceed --max-timeout-secs");
    }

    let store = open_store(args.db_path.as_deref())?;
    let catalog = Arc::new(Catalog::new(store, Arc::clone(&config)));
    let gateway = Arc::new(InvocationGateway::with_default_executors(
        Arc::clone(&catalog),
        Arc::clone(&config),
    )?);

    let registry = ServiceRegistry::new();
    registry.register(Arc::clone(&catalog));
    registry.register(Arc::clone(&gateway));
    registry
        .init_all(&ServiceContext {
            config: Arc::clone(&config),
        })
        .await?;

    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        public_url: args.public_url,
        cors_origins: args.cors_origins,
        request_timeout: config.max_invoke_timeout + Duration::from_secs(30),
        ..NetworkConfig::default()
    };
    let mut network = NetworkModule::new(network_config, catalog, gateway);
    network.start().await?;

    let served = network.serve(shutdown_signal()).await;
    let stopped = registry.shutdown_all(false).await;
    info!("scoring server stopped");
    served.and(stopped)
}
