use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use shared_publisher::config::Config;
use shared_publisher::publisher::Publisher;
use shared_publisher::server::Server;
use shared_publisher::{http, telemetry};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Relay hub for cross-chain transaction batches.
#[derive(Debug, Parser)]
#[command(name = "shared-publisher", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "configs/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    telemetry::init(&config.log).context("failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting shared publisher"
    );

    let server = Arc::new(Server::new(config.server.to_server_config()?));
    let publisher = Arc::new(Publisher::new(server, config.publisher.stats_interval));

    let root = CancellationToken::new();
    publisher
        .start(root.clone())
        .await
        .context("failed to start publisher")?;

    let http_shutdown = CancellationToken::new();
    let http_task = if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        let router = http::router(Arc::clone(&publisher), &config.metrics.path);
        let shutdown = http_shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = http::serve(addr, router, shutdown).await {
                tracing::error!(error = %e, "HTTP server error");
            }
        }))
    } else {
        None
    };

    wait_for_signal().await;
    tracing::info!("Shutting down");

    root.cancel();

    http_shutdown.cancel();
    if let Some(task) = http_task {
        let _ = task.await;
    }

    if let Err(e) = publisher.stop(SHUTDOWN_DEADLINE).await {
        tracing::error!(error = %e, "Failed to stop publisher cleanly");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Received shutdown signal"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Received shutdown signal"),
    }
}
