use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bulwark::config::{BulwarkConfig, LoggingConfig, StoreConfig};
use bulwark::http::HttpServer;
use bulwark::pow::ProofOfWorkGate;
use bulwark::ratelimit::{BurstGuard, BurstSweeper, RateLimitOrchestrator};
use bulwark::store::{MemoryStore, RedisStore, ResilientStore, RetryPolicy, SharedStore};

#[derive(Debug, Parser)]
#[command(name = "bulwark", version, about = "Layered rate limiting and abuse prevention")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = BulwarkConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Bulwark");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let store = connect_store(&config.store).await?;

    let burst = Arc::new(BurstGuard::new());
    let sweeper = BurstSweeper::spawn(burst.clone(), config.rate_limiting.sweep_interval());

    let rate_limiter = Arc::new(RateLimitOrchestrator::new(
        burst,
        store.clone(),
        config.rate_limiting.clone(),
    ));
    let pow = Arc::new(ProofOfWorkGate::new(store, config.pow.clone()));
    info!("Rate limiter initialized");

    HttpServer::new(config.server.http_addr, rate_limiter, pow)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await?;

    info!("Bulwark stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn SharedStore>> {
    let backend: Arc<dyn SharedStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::connect(url, &config.key_prefix).await?),
        None => {
            warn!("No redis_url configured, counters and challenges are local to this process");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(Arc::new(ResilientStore::new(backend, RetryPolicy::from(config))))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
