//! Broadcast-channel publisher feeding WebSocket subscribers.

use tokio::sync::broadcast;

use super::emitter::MetadataPublisher;
use crate::protocol_constants::METADATA_CHANNEL_CAPACITY;
use crate::stream::NowPlaying;

/// Forwards announcements to a `tokio::sync::broadcast` channel.
///
/// Publishing with no subscribers is not an error; the announcement is
/// simply dropped. Slow subscribers see `Lagged` and skip ahead.
#[derive(Clone)]
pub struct BroadcastMetadataPublisher {
    tx: broadcast::Sender<NowPlaying>,
}

impl BroadcastMetadataPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns a new receiver for the channel.
    pub fn subscribe(&self) -> broadcast::Receiver<NowPlaying> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastMetadataPublisher {
    fn default() -> Self {
        Self::new(METADATA_CHANNEL_CAPACITY)
    }
}

impl MetadataPublisher for BroadcastMetadataPublisher {
    fn publish(&self, metadata: NowPlaying) {
        tracing::debug!(
            ?metadata,
            subscribers = self.tx.receiver_count(),
            "metadata_published"
        );
        if let Err(e) = self.tx.send(metadata) {
            log::trace!("[Metadata] No subscribers for {}", e.0.station_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(station_id: &str) -> NowPlaying {
        NowPlaying {
            station_id: station_id.to_string(),
            title: "Song".to_string(),
            artist: "Band".to_string(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_metadata() {
        let publisher = BroadcastMetadataPublisher::default();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();
        assert_eq!(publisher.receiver_count(), 2);

        publisher.publish(sample("wefunk"));

        assert_eq!(first.recv().await.unwrap(), sample("wefunk"));
        assert_eq!(second.recv().await.unwrap(), sample("wefunk"));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let publisher = BroadcastMetadataPublisher::new(4);
        publisher.publish(sample("bbc6"));
        assert_eq!(publisher.receiver_count(), 0);
    }
}
