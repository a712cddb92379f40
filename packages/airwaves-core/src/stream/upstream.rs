//! Upstream station connections.
//!
//! A connection runs as its own task and reports back through a channel of
//! [`StationEvent`]s, each tagged with the generation it was started under.
//! The relay drops events whose generation is no longer current, so a
//! superseded connection can never write into live state.

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::ErrorCode;
use crate::protocol_constants::ICY_METADATA_REQUEST_HEADER;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Station;
use crate::stream::icy::{IcyDemuxer, IcySegment};

/// Errors that end an upstream connection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connect, TLS or body read failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),

    /// The relay is no longer receiving events.
    #[error("relay event channel closed")]
    ChannelClosed,
}

/// Lifecycle events surfaced by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// Audio bytes with metadata blocks already removed.
    DataChunk(Bytes),
    /// A raw ICY metadata block.
    MetadataUpdate(Bytes),
    /// The connection ended (cleanly or not).
    Closed,
}

/// An [`UpstreamEvent`] tagged with its station and generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationEvent {
    pub station_id: String,
    pub generation: u64,
    pub event: UpstreamEvent,
}

impl StationEvent {
    pub fn new(station_id: impl Into<String>, generation: u64, event: UpstreamEvent) -> Self {
        Self {
            station_id: station_id.into(),
            generation,
            event,
        }
    }
}

/// Keeps a connection alive; dropping it stops the connection task.
pub struct UpstreamHandle {
    _guard: Option<DropGuard>,
}

impl UpstreamHandle {
    /// Wraps a token that is cancelled when the handle is dropped.
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            _guard: Some(token.drop_guard()),
        }
    }

    /// A handle that controls nothing, for connectors without a task.
    #[must_use]
    pub fn detached() -> Self {
        Self { _guard: None }
    }
}

/// Opens upstream connections.
///
/// `connect` must return immediately; results arrive on `events`.
pub trait UpstreamConnector: Send + Sync {
    fn connect(
        &self,
        station: &Station,
        generation: u64,
        events: mpsc::Sender<StationEvent>,
    ) -> UpstreamHandle;
}

/// Connector for ICY/Shoutcast HTTP streams.
pub struct IcyConnector {
    client: reqwest::Client,
    spawner: TokioSpawner,
    /// Parent of every connection token, cancelled on shutdown.
    cancel: CancellationToken,
}

impl IcyConnector {
    pub fn new(client: reqwest::Client, spawner: TokioSpawner, cancel: CancellationToken) -> Self {
        Self {
            client,
            spawner,
            cancel,
        }
    }
}

impl UpstreamConnector for IcyConnector {
    fn connect(
        &self,
        station: &Station,
        generation: u64,
        events: mpsc::Sender<StationEvent>,
    ) -> UpstreamHandle {
        let token = self.cancel.child_token();
        let task_token = token.clone();
        let client = self.client.clone();
        let station = station.clone();

        self.spawner.spawn(async move {
            log::info!(
                "[Upstream] Connecting {} (generation {}) to {}",
                station.id,
                generation,
                station.url
            );

            let outcome = tokio::select! {
                _ = task_token.cancelled() => Ok(()),
                result = pump(&client, &station, generation, &events) => result,
            };

            match outcome {
                Ok(()) => log::info!(
                    "[Upstream] {} (generation {}) ended",
                    station.id,
                    generation
                ),
                Err(e) => log::warn!(
                    "[Upstream] {} (generation {}) failed [{}]: {}",
                    station.id,
                    generation,
                    e.code(),
                    e
                ),
            }

            let closed = StationEvent::new(station.id, generation, UpstreamEvent::Closed);
            if events.send(closed).await.is_err() {
                log::trace!("[Upstream] Relay gone before close event was delivered");
            }
        });

        UpstreamHandle::new(token)
    }
}

/// Streams one upstream response into `events` until EOF or error.
async fn pump(
    client: &reqwest::Client,
    station: &Station,
    generation: u64,
    events: &mpsc::Sender<StationEvent>,
) -> Result<(), UpstreamError> {
    let response = client
        .get(&station.url)
        .header(ICY_METADATA_REQUEST_HEADER, "1")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::HttpStatus(status.as_u16()));
    }

    let metaint = IcyDemuxer::metaint_from_headers(response.headers());
    log::debug!(
        "[Upstream] {} connected: status={}, metaint={:?}",
        station.id,
        status,
        metaint
    );

    let mut demuxer = IcyDemuxer::new(metaint);
    let mut segments = Vec::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        demuxer.push(&chunk?, &mut segments);

        for segment in segments.drain(..) {
            let event = match segment {
                IcySegment::Audio(bytes) => UpstreamEvent::DataChunk(bytes),
                IcySegment::Metadata(raw) => UpstreamEvent::MetadataUpdate(raw),
            };
            events
                .send(StationEvent::new(station.id.as_str(), generation, event))
                .await
                .map_err(|_| UpstreamError::ChannelClosed)?;
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_handle_cancels_connection_token() {
        let token = CancellationToken::new();
        let handle = UpstreamHandle::new(token.clone());
        assert!(!token.is_cancelled());

        drop(handle);
        assert!(token.is_cancelled());
    }

    #[test]
    fn detached_handle_is_inert() {
        drop(UpstreamHandle::detached());
    }

    #[tokio::test]
    async fn unreachable_upstream_reports_closed_with_generation() {
        let cancel = CancellationToken::new();
        let connector = IcyConnector::new(
            reqwest::Client::new(),
            TokioSpawner::current(),
            cancel.clone(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        // Port 9 (discard) on localhost is closed in test environments.
        let station = Station::new("dead", "http://127.0.0.1:9/stream", "Dead");

        let _handle = connector.connect(&station, 7, tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, StationEvent::new("dead", 7, UpstreamEvent::Closed));
    }

    #[tokio::test]
    async fn cancelled_connection_still_reports_closed() {
        let cancel = CancellationToken::new();
        let connector = IcyConnector::new(
            reqwest::Client::new(),
            TokioSpawner::current(),
            cancel.clone(),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let station = Station::new("gone", "http://127.0.0.1:9/stream", "Gone");

        cancel.cancel();
        let _handle = connector.connect(&station, 1, tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, UpstreamEvent::Closed);
        assert_eq!(event.generation, 1);
    }
}
