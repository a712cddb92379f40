//! Configuration and station catalogue types.
//!
//! [`Config`] holds the relay tunables; [`StationRegistry`] holds the
//! immutable, ordered station list supplied at startup.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_BIND_PORT, DEFAULT_CLIENT_QUEUE_CAPACITY, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_FRESHNESS_WINDOW_MS, DEFAULT_HEALTH_CHECK_INTERVAL_SECS, DEFAULT_LOOKBACK_CAPACITY,
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_METADATA_REPUBLISH_INTERVAL_SECS,
    DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS, TITLE_FIRST_STATIONS,
};

// ─────────────────────────────────────────────────────────────────────────────
// Stations
// ─────────────────────────────────────────────────────────────────────────────

/// Order of the two halves of an ICY `StreamTitle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagOrder {
    /// `"<artist> - <title>"`, what nearly every broadcaster sends.
    ArtistTitle,
    /// `"<title> - <artist>"`.
    TitleArtist,
}

impl TagOrder {
    /// Looks up the built-in order for a station ID.
    #[must_use]
    pub fn for_station(id: &str) -> Self {
        if TITLE_FIRST_STATIONS.contains(&id) {
            Self::TitleArtist
        } else {
            Self::ArtistTitle
        }
    }
}

/// A radio station the relay republishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Short identifier used in stream URLs (`/stream/{id}`).
    pub id: String,
    /// Upstream ICY/Shoutcast URL.
    pub url: String,
    /// Human readable name.
    #[serde(alias = "name")]
    pub display_name: String,
    /// Explicit tag order; falls back to [`TagOrder::for_station`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_order: Option<TagOrder>,
}

impl Station {
    /// Creates a station using the built-in tag order for its ID.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            display_name: display_name.into(),
            tag_order: None,
        }
    }

    /// Returns the effective tag order for this station.
    #[must_use]
    pub fn tag_order(&self) -> TagOrder {
        self.tag_order
            .unwrap_or_else(|| TagOrder::for_station(&self.id))
    }
}

/// Immutable, ordered list of stations.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<Station>,
}

impl StationRegistry {
    /// Creates a registry, rejecting empty or duplicate IDs and empty URLs.
    pub fn new(stations: Vec<Station>) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for station in &stations {
            if station.id.trim().is_empty() {
                return Err("station id must not be empty".to_string());
            }
            if station.url.trim().is_empty() {
                return Err(format!("station '{}' has an empty url", station.id));
            }
            if !seen.insert(station.id.as_str()) {
                return Err(format!("duplicate station id '{}'", station.id));
            }
        }
        Ok(Self { stations })
    }

    /// Looks up a station by ID.
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Iterates stations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the relay core.
///
/// Groups buffering, watchdog and fan-out parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    /// Lookback buffer capacity per station (bytes).
    pub lookback_capacity: usize,

    /// Interval between watchdog checks (seconds).
    pub health_check_interval_secs: u64,

    /// Maximum upstream silence before a station counts as stalled (milliseconds).
    pub freshness_window_ms: u64,

    /// Consecutive failed checks after which reconnects stop.
    pub max_consecutive_failures: u32,

    /// Interval between unconditional metadata re-announcements (seconds).
    pub metadata_republish_interval_secs: u64,

    /// Chunks queued per listener before chunks are dropped for that listener.
    pub client_queue_capacity: usize,

    /// Capacity of the upstream event channel.
    pub event_channel_capacity: usize,

    /// Upstream connect timeout (seconds).
    pub upstream_connect_timeout_secs: u64,
}

impl RelayConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.lookback_capacity == 0 {
            return Err("lookback_capacity must be >= 1".to_string());
        }
        if self.health_check_interval_secs == 0 {
            return Err("health_check_interval_secs must be >= 1".to_string());
        }
        if self.freshness_window_ms == 0 {
            return Err("freshness_window_ms must be >= 1".to_string());
        }
        if self.metadata_republish_interval_secs == 0 {
            return Err("metadata_republish_interval_secs must be >= 1".to_string());
        }
        if self.client_queue_capacity == 0 {
            return Err(
                "client_queue_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        if self.upstream_connect_timeout_secs == 0 {
            return Err("upstream_connect_timeout_secs must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    #[must_use]
    pub fn metadata_republish_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_republish_interval_secs)
    }

    #[must_use]
    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            lookback_capacity: DEFAULT_LOOKBACK_CAPACITY,
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            metadata_republish_interval_secs: DEFAULT_METADATA_REPUBLISH_INTERVAL_SECS,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            upstream_connect_timeout_secs: DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the Airwaves relay.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Port for the HTTP server.
    pub preferred_port: u16,

    /// Relay core tunables.
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_BIND_PORT,
            relay: RelayConfig::default(),
        }
    }
}
