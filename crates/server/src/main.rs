//! segmentd server binary.
//!
//! Launches the user-segmentation service: HTTP JSON API, PostgreSQL-backed
//! store, and the TTL sweeper background task.
//!
//! # Usage
//!
//! ```bash
//! # Durable mode against a configured database
//! segmentd --config /etc/segmentd/config.toml
//!
//! # Ephemeral mode on the in-memory store
//! segmentd --ephemeral --listen 127.0.0.1:8080
//!
//! # Environment variables override file values
//! SEGMENTD__SWEEPER__INTERVAL_SECS=30 segmentd
//! ```

use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use segmentd_server::api;
use segmentd_server::bootstrap;
use segmentd_server::config::{Cli, Config};
use segmentd_server::shutdown::{shutdown_signal, ShutdownCoordinator};
use segmentd_types::config::LogFormat;

/// Top-level error type for the server binary, wrapping startup and runtime
/// failures.
#[derive(Debug)]
enum ServerError {
    Config(String),
    Bootstrap(segmentd_types::SegmentError),
    Server(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "config error: {}", msg),
            ServerError::Bootstrap(err) => write!(f, "bootstrap error: {}", err),
            ServerError::Server(err) => write!(f, "server error: {}", err),
        }
    }
}

impl std::error::Error for ServerError {}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Parse CLI args (clap handles --help and --version)
    let cli = Cli::parse();

    let mut config =
        Config::load(cli.config.as_ref()).map_err(|e| ServerError::Config(e.to_string()))?;
    config.apply_cli(&cli);
    config.validate().map_err(|e| ServerError::Config(e.to_string()))?;

    init_logging(&config);

    if let Some(metrics_addr) = config.metrics_addr {
        init_metrics_exporter(metrics_addr)?;
    }

    tracing::info!(
        listen_addr = %config.http.listen_addr,
        sweep_interval_secs = config.sweeper.interval_secs,
        ephemeral = config.is_ephemeral(),
        "Starting segmentd"
    );

    let server = bootstrap::bootstrap(&config).await.map_err(ServerError::Bootstrap)?;

    // One coordinator fans shutdown out to the sweeper and the HTTP server.
    let coordinator = ShutdownCoordinator::new();
    let sweeper_handle = server.sweeper.start(coordinator.subscribe());
    let mut server_shutdown = coordinator.subscribe();

    tokio::spawn(async move {
        shutdown_signal().await;
        coordinator.shutdown();
    });

    let listener = tokio::net::TcpListener::bind(config.http.listen_addr)
        .await
        .map_err(ServerError::Server)?;

    tracing::info!("Server ready, accepting connections");
    axum::serve(listener, api::router(server.state))
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        })
        .await
        .map_err(ServerError::Server)?;

    // The sweeper received the same broadcast; wait for its loop to exit.
    let _ = sweeper_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the logging system based on configuration.
///
/// Supports three formats:
/// - `text`: Human-readable format (development)
/// - `json`: JSON structured logging (production)
/// - `auto`: JSON for non-TTY stdout, text otherwise
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match config.logging.format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stdout().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).init();
    }
}

/// Initializes the Prometheus metrics exporter.
///
/// Starts an HTTP listener that exposes sweeper and request counters at
/// `/metrics`.
fn init_metrics_exporter(addr: SocketAddr) -> Result<(), ServerError> {
    PrometheusBuilder::new().with_http_listener(addr).install().map_err(|e| {
        ServerError::Server(std::io::Error::other(format!(
            "failed to install Prometheus exporter: {e}"
        )))
    })?;

    tracing::info!(metrics_addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}
