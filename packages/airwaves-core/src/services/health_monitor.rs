//! Upstream watchdog.
//!
//! On every tick each station is checked for a stall: no audio within the
//! freshness window, or a connection that is not live. Stalled stations are
//! reconnected until the consecutive-failure ceiling is reached, after which
//! they stay down until the process restarts.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::relay::{Liveness, RelayManager};
use crate::state::RelayConfig;

/// Outcome of checking one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// Stalled; reconnect. `attempt` counts from 1.
    Reconnect { attempt: u32 },
    /// Stalled with the failure ceiling reached; leave it down.
    GaveUp { failures: u32 },
}

/// Stall detection and retry ceiling.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogPolicy {
    pub freshness_window: Duration,
    pub max_consecutive_failures: u32,
}

impl WatchdogPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            freshness_window: config.freshness_window(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }

    pub fn is_stalled(&self, liveness: &Liveness, now: Instant) -> bool {
        if !liveness.is_live {
            return true;
        }
        match liveness.last_data_at {
            Some(at) => now.saturating_duration_since(at) > self.freshness_window,
            None => true,
        }
    }

    /// Checks a station and records a failure if it is stalled.
    pub fn assess(&self, liveness: &mut Liveness, now: Instant) -> HealthVerdict {
        if !self.is_stalled(liveness, now) {
            return HealthVerdict::Healthy;
        }

        let before = liveness.consecutive_failures;
        liveness.consecutive_failures = before.saturating_add(1);

        if before < self.max_consecutive_failures {
            HealthVerdict::Reconnect {
                attempt: liveness.consecutive_failures,
            }
        } else {
            HealthVerdict::GaveUp {
                failures: liveness.consecutive_failures,
            }
        }
    }
}

/// Periodic watchdog over every station of a [`RelayManager`].
pub struct HealthMonitor {
    relay: Arc<RelayManager>,
    policy: WatchdogPolicy,
    interval: Duration,
    spawner: TokioSpawner,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        relay: Arc<RelayManager>,
        config: &RelayConfig,
        spawner: TokioSpawner,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            relay,
            policy: WatchdogPolicy::from_config(config),
            interval: config.health_check_interval(),
            spawner,
            cancel,
        }
    }

    /// Runs one check of all stations as of `now`. Returns the IDs that were
    /// reconnected.
    pub fn check_at(&self, now: Instant) -> Vec<String> {
        let mut reconnected = Vec::new();

        for station_id in self.relay.station_ids() {
            let verdict = match self
                .relay
                .with_liveness(&station_id, |l| self.policy.assess(l, now))
            {
                Ok(verdict) => verdict,
                Err(e) => {
                    log::error!("[Health] {}", e);
                    continue;
                }
            };

            match verdict {
                HealthVerdict::Healthy => {}
                HealthVerdict::Reconnect { attempt } => {
                    log::warn!(
                        "[Health] {} stalled, reconnecting (attempt {}/{})",
                        station_id,
                        attempt,
                        self.policy.max_consecutive_failures
                    );
                    match self.relay.connect(&station_id) {
                        Ok(_) => reconnected.push(station_id),
                        Err(e) => log::error!("[Health] Reconnect of {} failed: {}", station_id, e),
                    }
                }
                HealthVerdict::GaveUp { failures } => {
                    if failures == self.policy.max_consecutive_failures.saturating_add(1) {
                        log::error!(
                            "[Health] {} failed {} consecutive checks, giving up",
                            station_id,
                            self.policy.max_consecutive_failures
                        );
                    } else {
                        log::debug!("[Health] {} still down ({} failures)", station_id, failures);
                    }
                }
            }
        }

        reconnected
    }

    /// Spawns the tick loop. The first check runs one interval after start.
    pub fn start(self: &Arc<Self>) {
        let monitor = Arc::clone(self);

        self.spawner.spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + monitor.interval, monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            log::info!(
                "[Health] Watchdog started (every {:?}, freshness {:?})",
                monitor.interval,
                monitor.policy.freshness_window
            );

            loop {
                tokio::select! {
                    _ = monitor.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.check_at(Instant::now());
                    }
                }
            }

            log::info!("[Health] Watchdog stopped");
        });
    }
}
