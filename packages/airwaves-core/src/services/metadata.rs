//! Periodic metadata re-announcement.
//!
//! Subscribers that connect between title changes would otherwise wait for the
//! next change; re-announcing every cached entry on a fixed cadence bounds
//! that wait to one period.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::relay::RelayManager;

pub struct MetadataRepublisher {
    relay: Arc<RelayManager>,
    interval: Duration,
    spawner: TokioSpawner,
    cancel: CancellationToken,
}

impl MetadataRepublisher {
    pub fn new(
        relay: Arc<RelayManager>,
        interval: Duration,
        spawner: TokioSpawner,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            relay,
            interval,
            spawner,
            cancel,
        }
    }

    /// Spawns the cadence loop. The first round runs one interval after start.
    pub fn start(&self) {
        let relay = Arc::clone(&self.relay);
        let interval = self.interval;
        let cancel = self.cancel.clone();

        self.spawner.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sent = relay.republish_metadata();
                        log::debug!("[Metadata] Re-announced {} station(s)", sent);
                    }
                }
            }
        });
    }
}
