//! Application bootstrap and dependency wiring.
//!
//! The composition root: every service is created and wired here, in
//! dependency order, so the rest of the crate only sees traits and `Arc`s.

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::events::{BroadcastMetadataPublisher, MetadataPublisher};
use crate::protocol_constants::USER_AGENT;
use crate::runtime::TokioSpawner;
use crate::services::{HealthMonitor, MetadataRepublisher, RelayManager};
use crate::state::{Config, RelayConfig, StationRegistry};
use crate::stream::{IcyConnector, UpstreamConnector};

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Owns per-station state and listener subscriptions.
    pub relay: Arc<RelayManager>,
    /// Metadata broadcast feeding WebSocket subscribers.
    pub metadata: Arc<BroadcastMetadataPublisher>,
    /// Upstream watchdog.
    pub health_monitor: Arc<HealthMonitor>,
    /// Periodic metadata re-announcement.
    pub republisher: MetadataRepublisher,
    /// Configuration the services were built from.
    pub config: Arc<Config>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the event loop, connects every station and starts the timers.
    pub fn start_background_tasks(&self) {
        self.relay
            .start_event_loop(&self.spawner, self.cancel_token.clone());
        self.relay.connect_all();
        self.health_monitor.start();
        self.republisher.start();

        log::info!(
            "[Bootstrap] Relaying {} station(s)",
            self.relay.station_ids().len()
        );
    }

    /// Stops background tasks and upstream connections.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();
        let closed = self.relay.disconnect_all();
        log::info!("[Bootstrap] Closed {} upstream connection(s)", closed);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client used for all upstream connections.
///
/// Only the connect phase is bounded; stream bodies are read indefinitely.
fn create_http_client(config: &RelayConfig) -> RelayResult<Client> {
    Client::builder()
        .connect_timeout(config.upstream_connect_timeout())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all services with the ICY upstream connector.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client cannot
/// be built.
pub fn bootstrap_services(
    config: Config,
    stations: StationRegistry,
) -> RelayResult<BootstrappedServices> {
    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let http_client = create_http_client(&config.relay)?;

    let connector = Arc::new(IcyConnector::new(
        http_client,
        spawner.clone(),
        cancel_token.clone(),
    ));

    bootstrap_with_connector(config, stations, connector, spawner, cancel_token)
}

/// Bootstraps all services around a caller-supplied connector.
pub fn bootstrap_with_connector(
    config: Config,
    stations: StationRegistry,
    connector: Arc<dyn UpstreamConnector>,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
) -> RelayResult<BootstrappedServices> {
    config.relay.validate().map_err(RelayError::Configuration)?;
    if stations.is_empty() {
        log::warn!("[Bootstrap] No stations configured");
    }

    let config = Arc::new(config);
    let metadata = Arc::new(BroadcastMetadataPublisher::default());

    let relay = Arc::new(RelayManager::new(
        &stations,
        connector,
        Arc::clone(&metadata) as Arc<dyn MetadataPublisher>,
        &config.relay,
    ));

    let health_monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&relay),
        &config.relay,
        spawner.clone(),
        cancel_token.clone(),
    ));

    let republisher = MetadataRepublisher::new(
        Arc::clone(&relay),
        config.relay.metadata_republish_interval(),
        spawner.clone(),
        cancel_token.clone(),
    );

    Ok(BootstrappedServices {
        relay,
        metadata,
        health_monitor,
        republisher,
        config,
        spawner,
        cancel_token,
    })
}
