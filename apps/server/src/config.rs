//! Server configuration.
//!
//! Loaded from YAML with environment variable overrides. Without a file the
//! built-in station list is relayed with default tunables.

use std::path::Path;

use airwaves_core::{Config, RelayConfig, Station, StationRegistry};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `AIRWAVES_BIND_PORT`
    pub bind_port: u16,

    /// Stations to relay, in listing order.
    pub stations: Vec<Station>,

    /// Relay tunables.
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: airwaves_core::protocol_constants::DEFAULT_BIND_PORT,
            stations: default_stations(),
            relay: RelayConfig::default(),
        }
    }
}

/// The stations relayed when no configuration file names any.
fn default_stations() -> Vec<Station> {
    [
        ("bbc6", "http://bbcmedia.ic.llnwd.net/stream/bbcmedia_6music_mf_p", "BBC6"),
        ("dublab", "https://dublab.out.airtime.pro/dublab_a", "Dublab"),
        ("kcrw", "https://kcrw.streamguys1.com/kcrw_192k_mp3_e24", "KCRW"),
        ("wefunk", "http://s-00.wefunkradio.com:81/wefunk64.mp3", "WEFUNK"),
        ("balamii", "https://balamii.out.airtime.pro:8000/balamii_a", "Balamii"),
        ("n10as", "http://n10as.out.airtime.pro:8000/n10as_a", "n10.as"),
        (
            "blockfm",
            "https://image.block.fm/uploads/audio/002c2686-2ee1-485b-b1af-475986696bab.mp3",
            "block.fm",
        ),
        ("wxpn", "https://wxpnhi.xpn.org/xpnhi-nopreroll", "WXPN"),
        ("stubru", "http://icecast.vrtcdn.be/stubru-high.mp3", "StuBru"),
    ]
    .into_iter()
    .map(|(id, url, name)| Station::new(id, url, name))
    .collect()
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AIRWAVES_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("AIRWAVES_LOOKBACK_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.relay.lookback_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("AIRWAVES_HEALTH_CHECK_INTERVAL") {
            if let Ok(interval) = val.parse() {
                self.relay.health_check_interval_secs = interval;
            }
        }

        // Note: AIRWAVES_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to airwaves-core's Config type.
    pub fn to_core_config(&self) -> Config {
        Config {
            preferred_port: self.bind_port,
            relay: self.relay.clone(),
        }
    }

    /// Builds the station registry, rejecting duplicate or empty entries.
    pub fn station_registry(&self) -> Result<StationRegistry> {
        StationRegistry::new(self.stations.clone())
            .map_err(anyhow::Error::msg)
            .context("Invalid station list")
    }
}
