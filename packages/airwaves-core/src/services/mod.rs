//! Relay services.
//!
//! The relay manager owns station state; the watchdog and metadata
//! republisher drive it on timers.

pub mod health_monitor;
pub mod metadata;
pub mod relay;

pub use health_monitor::{HealthMonitor, HealthVerdict, WatchdogPolicy};
pub use metadata::MetadataRepublisher;
pub use relay::{Liveness, RelayManager, RelayStats, StationStatus, SubscribeOptions, Subscription};
