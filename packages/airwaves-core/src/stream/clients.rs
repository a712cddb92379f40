//! Downstream listener registry and fan-out.
//!
//! Writes never wait on a listener: a sink that is full or closed simply
//! misses the chunk, and only its own lifecycle (HTTP body dropped) or an
//! explicit unsubscribe removes it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Errors from writing to a listener sink.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The listener has gone away.
    #[error("sink closed")]
    Closed,
    /// The listener is not keeping up; the chunk was dropped.
    #[error("sink queue full")]
    Full,
}

/// Destination for a listener's audio bytes.
///
/// Implementations must not block: the relay calls `write` while holding the
/// station's state lock.
pub trait AudioSink: Send + Sync {
    fn write(&self, chunk: Bytes) -> Result<(), SinkError>;
}

impl AudioSink for mpsc::Sender<Bytes> {
    fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        self.try_send(chunk).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Opaque listener identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered listener.
pub struct ClientConnection {
    pub id: ClientId,
    pub station_id: String,
    pub joined_at: Instant,
    sink: Arc<dyn AudioSink>,
}

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Listeners of a single station, in registration order.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Vec<ClientConnection>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink and returns its ID.
    pub fn add(&mut self, station_id: &str, sink: Arc<dyn AudioSink>) -> ClientId {
        let id = ClientId::new();
        self.clients.push(ClientConnection {
            id,
            station_id: station_id.to_string(),
            joined_at: Instant::now(),
            sink,
        });
        id
    }

    /// Removes a listener, returning it if it was still registered.
    pub fn remove(&mut self, id: ClientId) -> Option<ClientConnection> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    /// Writes `chunk` to every listener in registration order.
    pub fn broadcast(&self, chunk: &Bytes) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for client in &self.clients {
            // Bytes::clone is an Arc bump, not a copy
            match client.sink.write(chunk.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.dropped += 1;
                    log::trace!(
                        "[Clients] Dropped {} bytes for {} on {}: {}",
                        chunk.len(),
                        client.id,
                        client.station_id,
                        e
                    );
                }
            }
        }
        report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{BrokenSink, RecordingSink};
    use super::*;

    #[test]
    fn broadcast_reaches_every_client_in_order() {
        let mut registry = ClientRegistry::new();
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        registry.add("bbc6", first.clone());
        registry.add("bbc6", second.clone());

        registry.broadcast(&Bytes::from_static(b"one"));
        registry.broadcast(&Bytes::from_static(b"two"));

        assert_eq!(first.chunks(), second.chunks());
        assert_eq!(first.bytes(), b"onetwo");
    }

    #[test]
    fn failing_sink_does_not_block_others_and_stays_registered() {
        let mut registry = ClientRegistry::new();
        let healthy = Arc::new(RecordingSink::default());
        registry.add("bbc6", Arc::new(BrokenSink));
        registry.add("bbc6", healthy.clone());

        let report = registry.broadcast(&Bytes::from_static(b"chunk"));

        assert_eq!(
            report,
            BroadcastReport {
                delivered: 1,
                dropped: 1
            }
        );
        assert_eq!(healthy.bytes(), b"chunk");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = ClientRegistry::new();
        let id = registry.add("bbc6", Arc::new(RecordingSink::default()));

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_reports_full_and_closed() {
        let (tx, mut rx) = mpsc::channel::<Bytes>(1);

        assert_eq!(tx.write(Bytes::from_static(b"a")), Ok(()));
        assert_eq!(tx.write(Bytes::from_static(b"b")), Err(SinkError::Full));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));

        drop(rx);
        assert_eq!(tx.write(Bytes::from_static(b"c")), Err(SinkError::Closed));
    }
}
