//! Publisher abstraction for "now playing" announcements.

use crate::stream::NowPlaying;

/// Announces station metadata without knowledge of transport.
///
/// Called from the relay's event loop and periodic republisher, so
/// implementations must return promptly.
pub trait MetadataPublisher: Send + Sync {
    fn publish(&self, metadata: NowPlaying);
}
