//! Airwaves Server - standalone internet radio relay.
//!
//! Relays the configured stations over HTTP with lookback buffering, upstream
//! watchdog and a "now playing" WebSocket feed.

mod config;

use std::path::PathBuf;

use airwaves_core::{bootstrap_services, start_server, AppState};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// Airwaves Server - internet radio relay.
#[derive(Parser, Debug)]
#[command(name = "airwaves-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AIRWAVES_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "AIRWAVES_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Airwaves Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }

    let stations = config.station_registry()?;
    log::info!(
        "Configuration: bind_port={}, stations={}, lookback={} bytes",
        config.bind_port,
        stations.len(),
        config.relay.lookback_capacity
    );

    let services = bootstrap_services(config.to_core_config(), stations)
        .context("Failed to bootstrap services")?;
    log::info!("Services bootstrapped successfully");

    services.start_background_tasks();
    log::info!("Background tasks started");

    let app_state = AppState::from(&services);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    // Cancels the server's graceful-shutdown future along with the relay tasks.
    services.shutdown();

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
