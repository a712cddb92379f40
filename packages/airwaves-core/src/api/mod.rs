//! HTTP/WebSocket API layer.
//!
//! Thin handlers over the relay manager, plus server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::BroadcastMetadataPublisher;
use crate::services::RelayManager;
use crate::state::Config;

pub mod http;
pub mod stream;
pub mod ws;

pub use http::create_router;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayManager>,
    /// Source of metadata announcements for WebSocket subscribers.
    pub metadata: Arc<BroadcastMetadataPublisher>,
    pub config: Arc<Config>,
    /// Cancelled on shutdown; ends long-lived WebSocket sessions.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        relay: Arc<RelayManager>,
        metadata: Arc<BroadcastMetadataPublisher>,
        config: Arc<Config>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            relay,
            metadata,
            config,
            shutdown,
        }
    }
}

impl From<&BootstrappedServices> for AppState {
    fn from(services: &BootstrappedServices) -> Self {
        Self::new(
            Arc::clone(&services.relay),
            Arc::clone(&services.metadata),
            Arc::clone(&services.config),
            services.cancel_token.clone(),
        )
    }
}

/// Serves the API until the state's shutdown token is cancelled.
///
/// Port 0 binds an OS-assigned port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.preferred_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    log::info!("Server listening on http://{}", local);
    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    log::info!("Server stopped");
    Ok(())
}
