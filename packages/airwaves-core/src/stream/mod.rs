//! Audio stream plumbing: upstream ingest, ICY demuxing, lookback caching and
//! listener fan-out.

pub mod clients;
pub mod icy;
pub mod lookback;
pub mod upstream;

use serde::Serialize;

use crate::state::TagOrder;

pub use clients::{AudioSink, BroadcastReport, ClientId, ClientRegistry, SinkError};
pub use icy::{parse_stream_title, split_stream_title, IcyDemuxer, IcySegment};
pub use lookback::{LookbackBuffer, LookbackError};
pub use upstream::{
    IcyConnector, StationEvent, UpstreamConnector, UpstreamError, UpstreamEvent, UpstreamHandle,
};

/// "Now playing" information for a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub station_id: String,
    pub title: String,
    pub artist: String,
}

impl NowPlaying {
    /// Builds metadata from a raw ICY block.
    ///
    /// A block without a `StreamTitle` yields empty title and artist.
    #[must_use]
    pub fn from_tag(station_id: &str, raw: &[u8], order: TagOrder) -> Self {
        let (title, artist) = parse_stream_title(raw)
            .map(|text| split_stream_title(&text, order))
            .unwrap_or_default();

        Self {
            station_id: station_id.to_string(),
            title,
            artist,
        }
    }
}
