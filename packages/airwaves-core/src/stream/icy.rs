//! ICY (Shoutcast) protocol metadata handling.
//!
//! Upstream servers that honour `Icy-MetaData: 1` interleave a metadata block
//! after every `icy-metaint` audio bytes. [`IcyDemuxer`] separates the two so
//! listeners only ever receive audio, and [`parse_stream_title`] /
//! [`split_stream_title`] turn a block into "now playing" fields.

use bytes::{Bytes, BytesMut};
use reqwest::header::HeaderMap;

use crate::protocol_constants::{ICY_METADATA_BLOCK_UNIT, ICY_METAINT_HEADER, ICY_STREAM_TITLE_KEY};
use crate::state::TagOrder;

/// A piece of demuxed upstream data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcySegment {
    /// Raw audio bytes.
    Audio(Bytes),
    /// A complete, non-empty metadata block (NUL padding included).
    Metadata(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// Reading audio; `remaining` bytes until the next length byte.
    Audio { remaining: usize },
    /// Next byte is a metadata length byte.
    Length,
    /// Collecting `remaining` more metadata bytes.
    Metadata { remaining: usize },
}

/// Stateful splitter for an ICY byte stream.
///
/// Each instance should be used for a single upstream connection.
pub struct IcyDemuxer {
    metaint: Option<usize>,
    state: DemuxState,
    metadata: BytesMut,
}

impl IcyDemuxer {
    /// Creates a demuxer. `None` means the server sends no metadata and the
    /// whole stream is audio.
    #[must_use]
    pub fn new(metaint: Option<usize>) -> Self {
        let metaint = metaint.filter(|&n| n > 0);
        Self {
            metaint,
            state: DemuxState::Audio {
                remaining: metaint.unwrap_or(0),
            },
            metadata: BytesMut::new(),
        }
    }

    /// Reads the metadata interval from upstream response headers.
    #[must_use]
    pub fn metaint_from_headers(headers: &HeaderMap) -> Option<usize> {
        headers
            .get(ICY_METAINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
    }

    /// Splits `chunk` into audio and metadata segments, appending them to `out`
    /// in stream order. Partial metadata blocks are carried across calls.
    pub fn push(&mut self, chunk: &Bytes, out: &mut Vec<IcySegment>) {
        let Some(metaint) = self.metaint else {
            if !chunk.is_empty() {
                out.push(IcySegment::Audio(chunk.clone()));
            }
            return;
        };

        let mut offset = 0;
        while offset < chunk.len() {
            match self.state {
                DemuxState::Audio { remaining } => {
                    let take = remaining.min(chunk.len() - offset);
                    // slice() shares the underlying allocation
                    out.push(IcySegment::Audio(chunk.slice(offset..offset + take)));
                    offset += take;
                    self.state = if take == remaining {
                        DemuxState::Length
                    } else {
                        DemuxState::Audio {
                            remaining: remaining - take,
                        }
                    };
                }
                DemuxState::Length => {
                    let len = chunk[offset] as usize * ICY_METADATA_BLOCK_UNIT;
                    offset += 1;
                    self.state = if len == 0 {
                        // Zero length means "no change"
                        DemuxState::Audio { remaining: metaint }
                    } else {
                        DemuxState::Metadata { remaining: len }
                    };
                }
                DemuxState::Metadata { remaining } => {
                    let take = remaining.min(chunk.len() - offset);
                    self.metadata
                        .extend_from_slice(&chunk[offset..offset + take]);
                    offset += take;
                    if take == remaining {
                        out.push(IcySegment::Metadata(self.metadata.split().freeze()));
                        self.state = DemuxState::Audio { remaining: metaint };
                    } else {
                        self.state = DemuxState::Metadata {
                            remaining: remaining - take,
                        };
                    }
                }
            }
        }
    }
}

/// Extracts the `StreamTitle` value from a raw metadata block.
///
/// Returns `None` when the block has no `StreamTitle` field.
#[must_use]
pub fn parse_stream_title(raw: &[u8]) -> Option<String> {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = String::from_utf8_lossy(&raw[..end]);

    let start = text.find(ICY_STREAM_TITLE_KEY)? + ICY_STREAM_TITLE_KEY.len();
    let rest = &text[start..];

    // Titles may contain apostrophes; only `';` or a trailing quote ends the value.
    let value = match rest.find("';") {
        Some(end) => &rest[..end],
        None => {
            let rest = rest.trim_end();
            rest.strip_suffix('\'').unwrap_or(rest)
        }
    };

    Some(value.trim().to_string())
}

/// Splits `"<A> - <B>"` on the first hyphen and returns `(title, artist)`.
///
/// A title without a hyphen lands entirely in the first half.
#[must_use]
pub fn split_stream_title(stream_title: &str, order: TagOrder) -> (String, String) {
    let (first, second) = match stream_title.split_once('-') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (stream_title.trim(), ""),
    };

    match order {
        TagOrder::ArtistTitle => (second.to_string(), first.to_string()),
        TagOrder::TitleArtist => (first.to_string(), second.to_string()),
    }
}
