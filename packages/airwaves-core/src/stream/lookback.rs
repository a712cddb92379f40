//! Bounded lookback cache of recent audio bytes.
//!
//! New listeners receive the cached bytes before live audio so playback can
//! start without waiting for the upstream to produce enough data.

use bytes::Bytes;
use thiserror::Error;

/// Errors from reading the lookback buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookbackError {
    /// Fewer bytes are stored than were requested.
    #[error("requested {requested} bytes but only {stored} are stored")]
    NotEnoughData { requested: usize, stored: usize },
}

/// Fixed-capacity byte cache holding the most recent suffix of a stream.
///
/// Stored bytes occupy `storage[position..position + len]`. Appends go after
/// the stored region; the region is shifted back to offset zero only when an
/// append would run past the end of the storage, evicting exactly as many of
/// the oldest bytes as the new chunk needs.
pub struct LookbackBuffer {
    storage: Box<[u8]>,
    /// Offset of the oldest stored byte.
    position: usize,
    /// Number of stored bytes.
    len: usize,
}

impl LookbackBuffer {
    /// Creates an empty buffer that holds at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `data`, evicting the oldest bytes if needed.
    ///
    /// Returns `false` without touching the buffer when `data` alone is larger
    /// than the capacity.
    pub fn append(&mut self, data: &[u8]) -> bool {
        let size = data.len();
        let capacity = self.capacity();

        if size > capacity {
            return false;
        }

        if self.position + self.len + size > capacity {
            self.compact(size);
        }

        let end = self.position + self.len;
        self.storage[end..end + size].copy_from_slice(data);
        self.len += size;
        true
    }

    /// Shifts stored bytes to offset zero, dropping just enough of the oldest
    /// bytes to leave room for `incoming` more.
    fn compact(&mut self, incoming: usize) {
        let evict = (self.len + incoming).saturating_sub(self.capacity());
        let start = self.position + evict;
        let end = self.position + self.len;

        self.storage.copy_within(start..end, 0);
        self.len -= evict;
        self.position = 0;
    }

    /// Returns the oldest `n` stored bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&[u8], LookbackError> {
        if n > self.len {
            return Err(LookbackError::NotEnoughData {
                requested: n,
                stored: self.len,
            });
        }
        Ok(&self.storage[self.position..self.position + n])
    }

    /// Copies the full stored content, oldest byte first.
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.storage[self.position..self.position + self.len])
    }

    /// Removes and returns the oldest `n` stored bytes.
    pub fn read(&mut self, n: usize) -> Result<Bytes, LookbackError> {
        let out = Bytes::copy_from_slice(self.peek(n)?);
        self.consume(n);
        Ok(out)
    }

    /// Moves the read position back over `n` already consumed bytes.
    ///
    /// Fails if fewer than `n` consumed bytes are still in storage (they may
    /// have been overwritten by a compaction).
    pub fn rewind(&mut self, n: usize) -> bool {
        if n > self.position {
            return false;
        }
        self.position -= n;
        self.len += n;
        true
    }

    pub fn read_u16_be(&mut self) -> Result<u16, LookbackError> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32_be(&mut self) -> Result<u32, LookbackError> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u64_be(&mut self) -> Result<u64, LookbackError> {
        self.read_array().map(u64::from_be_bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], LookbackError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.peek(N)?);
        self.consume(N);
        Ok(out)
    }

    fn consume(&mut self, n: usize) {
        self.position += n;
        self.len -= n;
    }
}
