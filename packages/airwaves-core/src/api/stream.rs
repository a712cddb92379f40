//! Listener audio endpoint.
//!
//! Each request becomes a relay subscription feeding a bounded channel; the
//! response body drains the channel. When the client disconnects the body is
//! dropped, which drops the [`ListenerGuard`] and unsubscribes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::AppState;
use crate::error::{RelayError, RelayResult};
use crate::protocol_constants::{APP_NAME, AUDIO_MPEG_MIME};
use crate::services::{SubscribeOptions, Subscription};

#[derive(Debug, Default, Deserialize)]
pub(super) struct StreamQuery {
    buffer: Option<String>,
}

impl StreamQuery {
    /// `?buffer=off` (or `false`/`0`) skips the lookback snapshot.
    fn skip_lookback(&self) -> bool {
        matches!(
            self.buffer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("off" | "false" | "0")
        )
    }
}

/// Owns a listener's subscription for the lifetime of its response body.
struct ListenerGuard {
    subscription: Subscription,
    started: Instant,
    bytes_sent: AtomicU64,
}

impl ListenerGuard {
    fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            started: Instant::now(),
            bytes_sent: AtomicU64::new(0),
        }
    }

    fn record(&self, chunk: &Bytes) {
        self.bytes_sent
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        log::info!(
            "[Stream] Listener {} on {} disconnected: {} bytes in {:?}",
            self.subscription.client_id(),
            self.subscription.station_id(),
            self.bytes_sent.load(Ordering::Relaxed),
            self.started.elapsed()
        );
    }
}

pub(super) async fn stream_audio(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> RelayResult<Response> {
    let options = SubscribeOptions {
        skip_lookback: query.skip_lookback(),
    };

    let (tx, rx) = mpsc::channel::<Bytes>(state.config.relay.client_queue_capacity);
    let subscription = state.relay.subscribe(&id, Arc::new(tx), options)?;

    log::info!(
        "[Stream] New listener {} on {} (lookback {})",
        subscription.client_id(),
        id,
        if options.skip_lookback { "off" } else { "on" }
    );

    let guard = ListenerGuard::new(subscription);
    // Bodies must end on shutdown or graceful shutdown waits on them forever.
    let body = ReceiverStream::new(rx)
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(move |chunk| {
            guard.record(&chunk);
            Ok::<Bytes, std::io::Error>(chunk)
        });

    Response::builder()
        .header(header::CONTENT_TYPE, AUDIO_MPEG_MIME)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("icy-name", APP_NAME)
        .body(Body::from_stream(body))
        .map_err(|e| RelayError::Internal(e.to_string()))
}
