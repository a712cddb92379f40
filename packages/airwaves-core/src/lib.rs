//! Airwaves Core - internet radio relay library.
//!
//! Opens one upstream ICY connection per configured station and republishes
//! the audio to any number of HTTP listeners, with a lookback cache for
//! instant start, a watchdog that reconnects stalled upstreams, and a
//! "now playing" metadata feed.
//!
//! # Architecture
//!
//! - [`stream`]: lookback buffer, ICY demuxing, upstream connector, listener fan-out
//! - [`services`]: relay manager, health monitor, metadata republisher
//! - [`events`]: metadata publishing seam
//! - [`api`]: HTTP and WebSocket endpoints
//! - [`bootstrap`]: service wiring
//! - [`state`]: configuration and station registry
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`UpstreamConnector`](stream::UpstreamConnector): opening station connections
//! - [`AudioSink`](stream::AudioSink): delivering audio to a listener
//! - [`MetadataPublisher`](events::MetadataPublisher): announcing metadata

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod stream;

pub use api::{create_router, start_server, AppState, ServerError};
pub use bootstrap::{bootstrap_services, bootstrap_with_connector, BootstrappedServices};
pub use error::{ErrorCode, RelayError, RelayResult};
pub use events::{BroadcastMetadataPublisher, MetadataPublisher};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{
    HealthMonitor, MetadataRepublisher, RelayManager, RelayStats, SubscribeOptions, Subscription,
};
pub use state::{Config, RelayConfig, Station, StationRegistry, TagOrder};
pub use stream::{AudioSink, IcyConnector, LookbackBuffer, NowPlaying, UpstreamConnector};
