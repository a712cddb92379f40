//! Metadata WebSocket.
//!
//! `GET /ws/metadata[?station=<id>]` streams `{stationId, title, artist}`
//! messages. With `station` set, only that station's announcements are
//! forwarded. Cached metadata is sent immediately on connect.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::error::RelayResult;
use crate::stream::NowPlaying;

#[derive(Debug, Default, Deserialize)]
pub(super) struct MetadataQuery {
    station: Option<String>,
}

/// Whether `metadata` should be forwarded to a subscriber filtering on `station`.
fn matches_station(metadata: &NowPlaying, station: Option<&str>) -> bool {
    station.map_or(true, |id| metadata.station_id == id)
}

fn to_message(metadata: &NowPlaying) -> Option<Message> {
    match serde_json::to_string(metadata) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            log::error!("[WS] Failed to serialize metadata: {}", e);
            None
        }
    }
}

/// WebSocket upgrade handler. Unknown stations are rejected before upgrading.
pub(super) async fn ws_metadata_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> RelayResult<Response> {
    if let Some(ref id) = query.station {
        state.relay.metadata(id)?;
    }
    Ok(ws
        .on_upgrade(move |socket| handle_metadata_socket(socket, state, query.station))
        .into_response())
}

/// Current cached metadata for the subscriber's filter.
fn initial_metadata(state: &AppState, station: Option<&str>) -> Vec<NowPlaying> {
    let ids = match station {
        Some(id) => vec![id.to_string()],
        None => state.relay.station_ids(),
    };
    ids.iter()
        .filter_map(|id| state.relay.metadata(id).ok().flatten())
        .collect()
}

async fn handle_metadata_socket(socket: WebSocket, state: AppState, station: Option<String>) {
    // Subscribe before reading the cache so no change slips between the two.
    let mut rx = state.metadata.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let filter = station.as_deref();

    log::info!("[WS] Metadata subscriber connected (station: {:?})", filter);

    for metadata in initial_metadata(&state, filter) {
        let Some(msg) = to_message(&metadata) else {
            continue;
        };
        if sender.send(msg).await.is_err() {
            log::debug!("[WS] Subscriber left before initial metadata was sent");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Subscribers have nothing to say; pings are answered by axum.
                Some(Ok(_)) => {}
            },
            event = rx.recv() => match event {
                Ok(metadata) => {
                    if !matches_station(&metadata, filter) {
                        continue;
                    }
                    let Some(msg) = to_message(&metadata) else {
                        continue;
                    };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("[WS] Metadata subscriber lagged, skipped {} message(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    log::info!("[WS] Metadata subscriber disconnected (station: {:?})", filter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::tests::test_state;
    use crate::stream::{StationEvent, UpstreamEvent};
    use bytes::Bytes;

    fn sample(station_id: &str) -> NowPlaying {
        NowPlaying {
            station_id: station_id.to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
        }
    }

    #[test]
    fn filter_matches_only_requested_station() {
        assert!(matches_station(&sample("bbc6"), Some("bbc6")));
        assert!(!matches_station(&sample("kcrw"), Some("bbc6")));
        assert!(matches_station(&sample("kcrw"), None));
    }

    #[test]
    fn message_is_camel_case_json() {
        let Some(Message::Text(text)) = to_message(&sample("wxpn")) else {
            panic!("expected a text message");
        };
        let parsed: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(parsed["stationId"], "wxpn");
        assert_eq!(parsed["artist"], "Artist");
    }

    #[test]
    fn initial_metadata_respects_filter() {
        let state = test_state();
        for id in ["bbc6", "kcrw"] {
            state.relay.connect(id).unwrap();
            state.relay.handle_event(StationEvent::new(
                id,
                1,
                UpstreamEvent::MetadataUpdate(Bytes::from_static(b"StreamTitle='A - B';")),
            ));
        }

        assert_eq!(initial_metadata(&state, None).len(), 2);
        let filtered = initial_metadata(&state, Some("kcrw"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].station_id, "kcrw");
        assert!(initial_metadata(&state, Some("kexp")).is_empty());
    }
}
