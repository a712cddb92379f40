//! Metadata event delivery.
//!
//! The relay announces [`NowPlaying`](crate::stream::NowPlaying) changes through
//! the [`MetadataPublisher`] trait. [`BroadcastMetadataPublisher`] fans them out
//! to WebSocket subscribers.

mod bridge;
mod emitter;

pub use bridge::BroadcastMetadataPublisher;
pub use emitter::MetadataPublisher;

#[cfg(test)]
pub(crate) use emitter::test_support;
