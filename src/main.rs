//! assetgate -- serves objects from an S3-compatible bucket over HTTP.
//!
//! On SIGTERM/SIGINT the listener stops accepting connections and in-flight
//! requests get `server.shutdown_timeout` seconds to finish.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use assetgate::config::{Config, LoggingConfig};
use assetgate::storage::backend::ObjectStore;
use assetgate::storage::s3::S3ObjectStore;

/// Command-line arguments for the assetgate server.
#[derive(Parser, Debug)]
#[command(
    name = "assetgate",
    version,
    about = "HTTP asset server in front of an S3-compatible bucket"
)]
struct Cli {
    /// Optional YAML configuration file.  Environment variables override it.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen address (`host:port` or `:port`).
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config: Config = assetgate::config::load_config(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Configuration loaded from {} and environment", path),
        None => info!("Configuration loaded from environment"),
    }

    if config.observability.metrics {
        assetgate::metrics::init_metrics()?;
        assetgate::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&config.storage).await?);

    if config.assets.allowed_prefixes.is_empty() {
        info!("Serving every key in bucket {}", config.storage.bucket);
    } else {
        info!(
            "Serving keys under {:?} in bucket {}",
            config.assets.allowed_prefixes, config.storage.bucket
        );
    }

    let bind_addr = config.server.bind_addr();
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);

    let state = Arc::new(assetgate::AppState::new(config, store));
    let app = assetgate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("assetgate listening on {}", bind_addr);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        res = &mut server => {
            res??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    let _ = stop_tx.send(true);
    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(res) => res??,
        Err(_) => warn!(
            "In-flight requests still running after {}s, exiting",
            shutdown_timeout.as_secs()
        ),
    }

    info!("assetgate shut down");
    Ok(())
}

/// Initialize the global tracing subscriber.  `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
