//! Fixed protocol constants and relay defaults.
//!
//! The ICY values are defined by the Shoutcast/Icecast wire format and must not
//! be changed. The relay defaults are starting points for [`RelayConfig`]
//! and can be overridden through configuration.
//!
//! [`RelayConfig`]: crate::state::RelayConfig

// ─────────────────────────────────────────────────────────────────────────────
// ICY Protocol (Shoutcast/Icecast metadata)
// ─────────────────────────────────────────────────────────────────────────────

/// Request header asking the upstream server to interleave metadata blocks.
pub const ICY_METADATA_REQUEST_HEADER: &str = "Icy-MetaData";

/// Response header carrying the number of audio bytes between metadata blocks.
pub const ICY_METAINT_HEADER: &str = "icy-metaint";

/// Metadata block length byte is expressed in units of this many bytes.
pub const ICY_METADATA_BLOCK_UNIT: usize = 16;

/// Key of the "now playing" field inside an ICY metadata block.
pub const ICY_STREAM_TITLE_KEY: &str = "StreamTitle='";

/// Stations whose broadcasters emit `"<title> - <artist>"` instead of the
/// usual `"<artist> - <title>"`.
pub const TITLE_FIRST_STATIONS: &[&str] = &["kcrw", "wumb"];

// ─────────────────────────────────────────────────────────────────────────────
// Relay Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Lookback buffer capacity per station (bytes).
///
/// 128 KiB is roughly 8 seconds of a 128 kbit/s MP3 stream.
pub const DEFAULT_LOOKBACK_CAPACITY: usize = 128 * 1024;

/// Interval between watchdog checks (seconds).
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 10;

/// Maximum upstream silence before a station is considered stalled (milliseconds).
pub const DEFAULT_FRESHNESS_WINDOW_MS: u64 = 3_000;

/// Consecutive failed checks after which the watchdog stops reconnecting.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Interval between unconditional metadata re-announcements (seconds).
pub const DEFAULT_METADATA_REPUBLISH_INTERVAL_SECS: u64 = 30;

/// Chunks queued per listener before further chunks are dropped for that listener.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the upstream event channel shared by all stations.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the metadata broadcast channel.
pub const METADATA_CHANNEL_CAPACITY: usize = 64;

/// Timeout for establishing an upstream TCP/TLS connection (seconds).
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Content type served to downstream listeners.
pub const AUDIO_MPEG_MIME: &str = "audio/mpeg";

/// Default port for the relay HTTP server.
pub const DEFAULT_BIND_PORT: u16 = 8000;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in protocol data (User-Agent, health endpoint).
pub const APP_NAME: &str = "Airwaves";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "airwaves";

/// User agent sent to upstream radio servers.
pub const USER_AGENT: &str = concat!("Airwaves/", env!("CARGO_PKG_VERSION"));
