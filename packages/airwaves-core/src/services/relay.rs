//! Relay manager: per-station state and upstream event handling.
//!
//! Responsibilities:
//! - Starting (re)connections and assigning connection generations
//! - Applying upstream events to the station's lookback, listeners and metadata
//! - Listener subscribe/unsubscribe
//! - Status and metadata reads for the API layer

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RelayError, RelayResult};
use crate::events::MetadataPublisher;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::{RelayConfig, Station, StationRegistry};
use crate::stream::{
    AudioSink, ClientId, ClientRegistry, LookbackBuffer, NowPlaying, StationEvent,
    UpstreamConnector, UpstreamEvent, UpstreamHandle,
};

// ─────────────────────────────────────────────────────────────────────────────
// Per-station state
// ─────────────────────────────────────────────────────────────────────────────

/// Connection liveness of one station, as seen by the watchdog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Liveness {
    /// Bumped on every (re)connect; events from older generations are dropped.
    pub generation: u64,
    /// When the current connection last delivered audio.
    pub last_data_at: Option<Instant>,
    /// Whether the current connection is delivering audio.
    pub is_live: bool,
    /// Watchdog checks failed since the last audio chunk.
    pub consecutive_failures: u32,
}

struct StationState {
    liveness: Liveness,
    lookback: LookbackBuffer,
    clients: ClientRegistry,
    metadata: Option<NowPlaying>,
    /// Dropping the handle cancels the connection task.
    upstream: Option<UpstreamHandle>,
}

struct StationSlot {
    station: Station,
    state: Mutex<StationState>,
}

impl StationSlot {
    fn new(station: Station, lookback_capacity: usize) -> Self {
        Self {
            station,
            state: Mutex::new(StationState {
                liveness: Liveness::default(),
                lookback: LookbackBuffer::new(lookback_capacity),
                clients: ClientRegistry::new(),
                metadata: None,
                upstream: None,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Options for [`RelayManager::subscribe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Start with live audio only, without the lookback snapshot.
    pub skip_lookback: bool,
}

/// A listener's registration. Dropping it unsubscribes.
pub struct Subscription {
    slot: Arc<StationSlot>,
    client_id: ClientId,
    active: AtomicBool,
}

impl Subscription {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn station_id(&self) -> &str {
        &self.slot.station.id
    }

    /// Removes the listener. Returns `false` if it was already removed,
    /// whether through this handle or [`RelayManager::unsubscribe`].
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        let Some(client) = self.slot.state.lock().clients.remove(self.client_id) else {
            return false;
        };
        log::info!(
            "[Relay] Client {} left {} after {:?}",
            client.id,
            client.station_id,
            client.joined_at.elapsed()
        );
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Connection status of one station: 1 when live, 0 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationStatus {
    pub id: String,
    pub status: u8,
}

/// Relay-wide listener and connection counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub active_connections: usize,
    pub per_station: Vec<StationStatus>,
}

// ─────────────────────────────────────────────────────────────────────────────
// RelayManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns all per-station state.
///
/// Upstream events arrive on a single channel and are applied one at a time by
/// the event loop. Each station's state sits behind its own lock, held only
/// for in-memory work; connector calls and metadata publishing happen outside
/// it.
pub struct RelayManager {
    slots: HashMap<String, Arc<StationSlot>>,
    /// Registration order, for stats and startup.
    order: Vec<Arc<StationSlot>>,
    connector: Arc<dyn UpstreamConnector>,
    publisher: Arc<dyn MetadataPublisher>,
    events_tx: mpsc::Sender<StationEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<StationEvent>>>,
}

impl RelayManager {
    pub fn new(
        registry: &StationRegistry,
        connector: Arc<dyn UpstreamConnector>,
        publisher: Arc<dyn MetadataPublisher>,
        config: &RelayConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity);

        let order: Vec<_> = registry
            .iter()
            .map(|station| Arc::new(StationSlot::new(station.clone(), config.lookback_capacity)))
            .collect();
        let slots = order
            .iter()
            .map(|slot| (slot.station.id.clone(), Arc::clone(slot)))
            .collect();

        Self {
            slots,
            order,
            connector,
            publisher,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn slot(&self, station_id: &str) -> RelayResult<&Arc<StationSlot>> {
        self.slots
            .get(station_id)
            .ok_or_else(|| RelayError::StationNotFound(station_id.to_string()))
    }

    /// Station IDs in registration order.
    pub fn station_ids(&self) -> Vec<String> {
        self.order.iter().map(|s| s.station.id.clone()).collect()
    }

    /// Stations in registration order.
    pub fn stations(&self) -> Vec<Station> {
        self.order.iter().map(|s| s.station.clone()).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connections
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts a new connection attempt and returns its generation.
    ///
    /// Returns immediately; the connection reports back through the event
    /// loop. The previous connection, if any, is cancelled once the new handle
    /// is stored, and its remaining events are discarded as stale.
    pub fn connect(&self, station_id: &str) -> RelayResult<u64> {
        let slot = self.slot(station_id)?;

        let generation = {
            let mut state = slot.state.lock();
            state.liveness.generation += 1;
            state.liveness.is_live = false;
            state.liveness.generation
        };

        let handle = self
            .connector
            .connect(&slot.station, generation, self.events_tx.clone());

        let mut state = slot.state.lock();
        if state.liveness.generation == generation {
            state.upstream = Some(handle);
        } else {
            // A newer attempt won the race; let this one go.
            log::debug!(
                "[Relay] {} generation {} superseded by {} before it started",
                station_id,
                generation,
                state.liveness.generation
            );
        }

        log::info!("[Relay] Connecting {} (generation {})", station_id, generation);
        Ok(generation)
    }

    /// Connects every station in registration order.
    pub fn connect_all(&self) {
        for slot in &self.order {
            if let Err(e) = self.connect(&slot.station.id) {
                log::error!("[Relay] Failed to connect {}: {}", slot.station.id, e);
            }
        }
    }

    /// Cancels every upstream connection. Returns how many were open.
    pub fn disconnect_all(&self) -> usize {
        let mut closed = 0;
        for slot in &self.order {
            let mut state = slot.state.lock();
            if state.upstream.take().is_some() {
                closed += 1;
            }
            state.liveness.is_live = false;
        }
        log::info!("[Relay] Disconnected {} upstream(s)", closed);
        closed
    }

    /// Runs `f` against a station's liveness under its lock.
    pub fn with_liveness<R>(
        &self,
        station_id: &str,
        f: impl FnOnce(&mut Liveness) -> R,
    ) -> RelayResult<R> {
        let slot = self.slot(station_id)?;
        let mut state = slot.state.lock();
        Ok(f(&mut state.liveness))
    }

    /// Copy of a station's liveness.
    pub fn liveness(&self, station_id: &str) -> RelayResult<Liveness> {
        self.with_liveness(station_id, |l| l.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawns the task that applies upstream events in arrival order.
    ///
    /// Only the first call has an effect.
    pub fn start_event_loop(self: &Arc<Self>, spawner: &TokioSpawner, cancel: CancellationToken) {
        let Some(mut rx) = self.events_rx.lock().take() else {
            log::warn!("[Relay] Event loop already started");
            return;
        };
        let relay = Arc::clone(self);

        spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => relay.handle_event(event),
                        None => break,
                    },
                }
            }
            log::info!("[Relay] Event loop stopped");
        });
    }

    /// Applies one upstream event, dropping it if its generation is stale.
    pub fn handle_event(&self, event: StationEvent) {
        let Some(slot) = self.slots.get(&event.station_id) else {
            log::warn!("[Relay] Event for unknown station {}", event.station_id);
            return;
        };

        let announcement = {
            let mut state = slot.state.lock();

            if event.generation != state.liveness.generation {
                log::trace!(
                    "[Relay] Discarding stale event for {} (generation {}, current {})",
                    event.station_id,
                    event.generation,
                    state.liveness.generation
                );
                return;
            }

            match event.event {
                UpstreamEvent::DataChunk(chunk) => {
                    state.liveness.last_data_at = Some(Instant::now());
                    state.liveness.is_live = true;
                    state.liveness.consecutive_failures = 0;

                    if !state.lookback.append(&chunk) {
                        log::debug!(
                            "[Relay] {}-byte chunk for {} exceeds lookback capacity {}",
                            chunk.len(),
                            event.station_id,
                            state.lookback.capacity()
                        );
                    }
                    state.clients.broadcast(&chunk);
                    None
                }
                UpstreamEvent::MetadataUpdate(raw) => {
                    let metadata =
                        NowPlaying::from_tag(&slot.station.id, &raw, slot.station.tag_order());
                    log::info!(
                        "[Metadata] {}: '{}' by '{}'",
                        event.station_id,
                        metadata.title,
                        metadata.artist
                    );
                    state.metadata = Some(metadata.clone());
                    Some(metadata)
                }
                UpstreamEvent::Closed => {
                    state.liveness.is_live = false;
                    log::info!(
                        "[Relay] {} upstream closed (generation {})",
                        event.station_id,
                        event.generation
                    );
                    None
                }
            }
        };

        if let Some(metadata) = announcement {
            self.publisher.publish(metadata);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a listener.
    ///
    /// Unless `skip_lookback` is set, the lookback snapshot is written to the
    /// sink before it is registered, so it always precedes live audio. The
    /// station's cached metadata is re-announced afterwards.
    pub fn subscribe(
        &self,
        station_id: &str,
        sink: Arc<dyn AudioSink>,
        options: SubscribeOptions,
    ) -> RelayResult<Subscription> {
        let slot = self.slot(station_id)?;

        let (client_id, cached) = {
            let mut state = slot.state.lock();

            if !options.skip_lookback && !state.lookback.is_empty() {
                let snapshot = state.lookback.snapshot();
                let len = snapshot.len();
                if let Err(e) = sink.write(snapshot) {
                    log::debug!(
                        "[Relay] Lookback write of {} bytes to new {} listener failed: {}",
                        len,
                        station_id,
                        e
                    );
                }
            }

            let client_id = state.clients.add(station_id, sink);
            log::info!(
                "[Relay] Client {} joined {} ({} listening, lookback {})",
                client_id,
                station_id,
                state.clients.len(),
                if options.skip_lookback { "off" } else { "on" }
            );
            (client_id, state.metadata.clone())
        };

        if let Some(metadata) = cached {
            self.publisher.publish(metadata);
        }

        Ok(Subscription {
            slot: Arc::clone(slot),
            client_id,
            active: AtomicBool::new(true),
        })
    }

    /// Removes a listener by ID. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, station_id: &str, client_id: ClientId) -> RelayResult<bool> {
        let slot = self.slot(station_id)?;
        Ok(slot.state.lock().clients.remove(client_id).is_some())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn stats(&self) -> RelayStats {
        let mut active_connections = 0;
        let per_station = self
            .order
            .iter()
            .map(|slot| {
                let state = slot.state.lock();
                active_connections += state.clients.len();
                StationStatus {
                    id: slot.station.id.clone(),
                    status: u8::from(state.liveness.is_live),
                }
            })
            .collect();

        RelayStats {
            active_connections,
            per_station,
        }
    }

    /// Last known metadata for a station, if any has been received.
    pub fn metadata(&self, station_id: &str) -> RelayResult<Option<NowPlaying>> {
        Ok(self.slot(station_id)?.state.lock().metadata.clone())
    }

    /// Re-announces every cached metadata entry. Returns how many were sent.
    pub fn republish_metadata(&self) -> usize {
        let cached: Vec<NowPlaying> = self
            .order
            .iter()
            .filter_map(|slot| slot.state.lock().metadata.clone())
            .collect();

        let count = cached.len();
        for metadata in cached {
            self.publisher.publish(metadata);
        }
        count
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::events::test_support::RecordingPublisher;
    use crate::stream::upstream::test_support::RecordingConnector;

    pub struct Harness {
        pub relay: Arc<RelayManager>,
        pub connector: Arc<RecordingConnector>,
        pub publisher: Arc<RecordingPublisher>,
    }

    pub fn stations() -> StationRegistry {
        StationRegistry::new(vec![
            Station::new("bbc6", "http://upstream.test/bbc6", "BBC6"),
            Station::new("kcrw", "http://upstream.test/kcrw", "KCRW"),
        ])
        .unwrap()
    }

    pub fn harness_with(config: RelayConfig) -> Harness {
        let connector = Arc::new(RecordingConnector::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let relay = Arc::new(RelayManager::new(
            &stations(),
            connector.clone(),
            publisher.clone(),
            &config,
        ));
        Harness {
            relay,
            connector,
            publisher,
        }
    }

    pub fn harness() -> Harness {
        harness_with(RelayConfig::default())
    }

    pub fn chunk(station_id: &str, generation: u64, data: &[u8]) -> StationEvent {
        StationEvent::new(
            station_id,
            generation,
            UpstreamEvent::DataChunk(bytes::Bytes::copy_from_slice(data)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{chunk, harness, harness_with};
    use super::*;
    use crate::stream::clients::test_support::RecordingSink;
    use bytes::Bytes;

    fn metadata_event(station_id: &str, generation: u64, tag: &str) -> StationEvent {
        StationEvent::new(
            station_id,
            generation,
            UpstreamEvent::MetadataUpdate(Bytes::from(tag.to_string())),
        )
    }

    #[test]
    fn connect_bumps_generation_and_calls_connector() {
        let h = harness();

        assert_eq!(h.relay.connect("bbc6").unwrap(), 1);
        assert_eq!(h.relay.connect("bbc6").unwrap(), 2);

        assert_eq!(
            h.connector.calls(),
            vec![("bbc6".to_string(), 1), ("bbc6".to_string(), 2)]
        );
        assert_eq!(h.relay.liveness("kcrw").unwrap().generation, 0);
    }

    #[test]
    fn connect_unknown_station_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.relay.connect("kexp"),
            Err(RelayError::StationNotFound(_))
        ));
    }

    #[test]
    fn stale_generation_events_are_discarded() {
        let h = harness();
        let sink = Arc::new(RecordingSink::default());
        h.relay.connect("bbc6").unwrap();
        h.relay.connect("bbc6").unwrap();
        let _sub = h
            .relay
            .subscribe("bbc6", sink.clone(), SubscribeOptions::default())
            .unwrap();

        h.relay.handle_event(chunk("bbc6", 1, b"old"));
        h.relay.handle_event(metadata_event("bbc6", 1, "StreamTitle='Old - Tag';"));
        assert!(sink.bytes().is_empty());
        assert!(!h.relay.liveness("bbc6").unwrap().is_live);
        assert_eq!(h.relay.metadata("bbc6").unwrap(), None);

        h.relay.handle_event(chunk("bbc6", 2, b"new"));
        assert_eq!(sink.bytes(), b"new");
        assert!(h.relay.liveness("bbc6").unwrap().is_live);
    }

    #[test]
    fn two_clients_receive_identical_chunks_in_order() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());
        let _a = h
            .relay
            .subscribe("bbc6", first.clone(), SubscribeOptions::default())
            .unwrap();
        let _b = h
            .relay
            .subscribe("bbc6", second.clone(), SubscribeOptions::default())
            .unwrap();

        for part in [&b"one"[..], b"two", b"three"] {
            h.relay.handle_event(chunk("bbc6", 1, part));
        }

        assert_eq!(first.chunks(), second.chunks());
        assert_eq!(first.bytes(), b"onetwothree");
    }

    #[test]
    fn unsubscribing_one_client_leaves_the_other_streaming() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        let leaving = Arc::new(RecordingSink::default());
        let staying = Arc::new(RecordingSink::default());
        let leaving_sub = h
            .relay
            .subscribe("bbc6", leaving.clone(), SubscribeOptions::default())
            .unwrap();
        let _staying_sub = h
            .relay
            .subscribe("bbc6", staying.clone(), SubscribeOptions::default())
            .unwrap();

        h.relay.handle_event(chunk("bbc6", 1, b"a"));
        assert!(leaving_sub.unsubscribe());
        h.relay.handle_event(chunk("bbc6", 1, b"b"));

        assert_eq!(leaving.bytes(), b"a");
        assert_eq!(staying.bytes(), b"ab");
        assert_eq!(h.relay.stats().active_connections, 1);
    }

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let h = harness();
        let sub = h
            .relay
            .subscribe(
                "bbc6",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();
        let id = sub.client_id();

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!h.relay.unsubscribe("bbc6", id).unwrap());
        drop(sub);
        assert_eq!(h.relay.stats().active_connections, 0);
    }

    #[test]
    fn handle_reports_removal_by_id_as_already_done() {
        let h = harness();
        let sub = h
            .relay
            .subscribe(
                "bbc6",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();

        assert!(h.relay.unsubscribe("bbc6", sub.client_id()).unwrap());
        assert!(!sub.unsubscribe());
        assert_eq!(h.relay.stats().active_connections, 0);
    }

    #[test]
    fn dropping_subscription_removes_client() {
        let h = harness();
        let sub = h
            .relay
            .subscribe(
                "kcrw",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();
        assert_eq!(sub.station_id(), "kcrw");
        assert_eq!(h.relay.stats().active_connections, 1);

        drop(sub);
        assert_eq!(h.relay.stats().active_connections, 0);
    }

    #[test]
    fn subscribe_unknown_station_is_not_found() {
        let h = harness();
        let result = h.relay.subscribe(
            "kexp",
            Arc::new(RecordingSink::default()),
            SubscribeOptions::default(),
        );
        assert!(matches!(result, Err(RelayError::StationNotFound(id)) if id == "kexp"));
    }

    #[test]
    fn new_client_gets_lookback_before_live_audio() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        let buffered = vec![0xAB; 64 * 1024];
        h.relay.handle_event(chunk("bbc6", 1, &buffered));

        let sink = Arc::new(RecordingSink::default());
        let _sub = h
            .relay
            .subscribe("bbc6", sink.clone(), SubscribeOptions::default())
            .unwrap();
        h.relay.handle_event(chunk("bbc6", 1, b"live"));

        let chunks = sink.chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), buffered.as_slice());
        assert_eq!(chunks[1].as_ref(), b"live");
    }

    #[test]
    fn skipping_lookback_receives_only_live_audio() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay.handle_event(chunk("bbc6", 1, &vec![0xAB; 64 * 1024]));

        let sink = Arc::new(RecordingSink::default());
        let _sub = h
            .relay
            .subscribe(
                "bbc6",
                sink.clone(),
                SubscribeOptions {
                    skip_lookback: true,
                },
            )
            .unwrap();
        assert!(sink.chunks().is_empty());

        h.relay.handle_event(chunk("bbc6", 1, b"live"));
        assert_eq!(sink.bytes(), b"live");
    }

    #[test]
    fn oversized_chunk_still_reaches_listeners() {
        let h = harness_with(RelayConfig {
            lookback_capacity: 4,
            ..Default::default()
        });
        h.relay.connect("bbc6").unwrap();
        let sink = Arc::new(RecordingSink::default());
        let _sub = h
            .relay
            .subscribe("bbc6", sink.clone(), SubscribeOptions::default())
            .unwrap();

        h.relay.handle_event(chunk("bbc6", 1, b"too large"));

        assert_eq!(sink.bytes(), b"too large");
        let late = Arc::new(RecordingSink::default());
        let _late_sub = h
            .relay
            .subscribe("bbc6", late.clone(), SubscribeOptions::default())
            .unwrap();
        assert!(late.chunks().is_empty());
    }

    #[test]
    fn metadata_is_cached_and_published_with_station_tag_order() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay.connect("kcrw").unwrap();

        h.relay
            .handle_event(metadata_event("bbc6", 1, "StreamTitle='Artist - Title';"));
        h.relay
            .handle_event(metadata_event("kcrw", 1, "StreamTitle='Artist - Title';"));

        let bbc6 = h.relay.metadata("bbc6").unwrap().unwrap();
        assert_eq!((bbc6.artist.as_str(), bbc6.title.as_str()), ("Artist", "Title"));
        let kcrw = h.relay.metadata("kcrw").unwrap().unwrap();
        assert_eq!((kcrw.title.as_str(), kcrw.artist.as_str()), ("Artist", "Title"));

        assert_eq!(h.publisher.published(), vec![bbc6, kcrw]);
    }

    #[test]
    fn malformed_tag_clears_metadata() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay
            .handle_event(metadata_event("bbc6", 1, "StreamTitle='Artist - Title';"));
        h.relay.handle_event(metadata_event("bbc6", 1, "garbage"));

        let cleared = h.relay.metadata("bbc6").unwrap().unwrap();
        assert!(cleared.title.is_empty() && cleared.artist.is_empty());
        assert_eq!(h.publisher.count_for("bbc6"), 2);
    }

    #[test]
    fn joining_listener_triggers_metadata_republish() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        let _quiet = h
            .relay
            .subscribe(
                "bbc6",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();
        assert_eq!(h.publisher.count_for("bbc6"), 0);

        h.relay
            .handle_event(metadata_event("bbc6", 1, "StreamTitle='A - B';"));
        let _second = h
            .relay
            .subscribe(
                "bbc6",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();

        assert_eq!(h.publisher.count_for("bbc6"), 2);
    }

    #[test]
    fn republish_sends_every_cached_entry() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay.connect("kcrw").unwrap();
        assert_eq!(h.relay.republish_metadata(), 0);

        h.relay
            .handle_event(metadata_event("bbc6", 1, "StreamTitle='A - B';"));
        h.relay
            .handle_event(metadata_event("kcrw", 1, "StreamTitle='C - D';"));

        assert_eq!(h.relay.republish_metadata(), 2);
        assert_eq!(h.publisher.published().len(), 4);
    }

    #[test]
    fn closed_event_marks_station_down_in_stats() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay.handle_event(chunk("bbc6", 1, b"x"));
        let _sub = h
            .relay
            .subscribe(
                "bbc6",
                Arc::new(RecordingSink::default()),
                SubscribeOptions::default(),
            )
            .unwrap();

        let stats = h.relay.stats();
        assert_eq!(stats.active_connections, 1);
        assert_eq!(
            stats.per_station,
            vec![
                StationStatus {
                    id: "bbc6".into(),
                    status: 1
                },
                StationStatus {
                    id: "kcrw".into(),
                    status: 0
                },
            ]
        );

        h.relay
            .handle_event(StationEvent::new("bbc6", 1, UpstreamEvent::Closed));
        assert_eq!(h.relay.stats().per_station[0].status, 0);
    }

    #[test]
    fn stats_serialize_camel_case() {
        let h = harness();
        let json = serde_json::to_value(h.relay.stats()).unwrap();
        assert_eq!(json["activeConnections"], 0);
        assert_eq!(json["perStation"][1]["id"], "kcrw");
        assert_eq!(json["perStation"][1]["status"], 0);
    }

    #[test]
    fn data_chunk_resets_failures() {
        let h = harness();
        h.relay.connect("bbc6").unwrap();
        h.relay
            .with_liveness("bbc6", |l| l.consecutive_failures = 4)
            .unwrap();

        h.relay.handle_event(chunk("bbc6", 1, b"x"));

        assert_eq!(h.relay.liveness("bbc6").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn disconnect_all_marks_stations_down() {
        let h = harness();
        h.relay.connect_all();
        h.relay.handle_event(chunk("bbc6", 1, b"x"));

        assert_eq!(h.relay.disconnect_all(), 2);
        assert!(h.relay.stats().per_station.iter().all(|s| s.status == 0));
    }

    #[tokio::test]
    async fn event_loop_applies_events_from_connections() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.relay
            .start_event_loop(&TokioSpawner::current(), cancel.clone());
        h.relay.connect("bbc6").unwrap();

        let (tx, mut rx) = mpsc::channel::<Bytes>(4);
        let _sub = h
            .relay
            .subscribe("bbc6", Arc::new(tx), SubscribeOptions::default())
            .unwrap();

        h.connector
            .sender()
            .send(chunk("bbc6", 1, b"through the loop"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"through the loop");
        cancel.cancel();
    }

    #[test]
    fn station_listing_preserves_registration_order() {
        let h = harness();
        assert_eq!(h.relay.station_ids(), vec!["bbc6", "kcrw"]);
        assert_eq!(h.relay.stations()[1].display_name, "KCRW");
    }
}
