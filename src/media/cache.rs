//! GOP (Group of Pictures) cache for late-joiner support
//!
//! A subscriber joining mid-stream cannot decode anything until the next
//! key frame. The cache holds every frame since the most recent key frame
//! so a new subscriber can be fed a decodable prefix immediately. Each
//! cached entry holds its own claim on the shared payload; replaying for
//! a subscriber takes one more claim per entry, and clearing drops them.

use std::collections::VecDeque;

use crate::buffer::SharedBuffer;
use crate::media::MediaType;

/// One cached media frame
#[derive(Debug, Clone)]
pub struct GopEntry {
    pub media_type: MediaType,
    pub timestamp: u32,
    pub payload: SharedBuffer,
}

/// FIFO of frames since the last key frame, bounded by bytes and entries
#[derive(Debug)]
pub struct GopCache {
    entries: VecDeque<GopEntry>,
    total_bytes: usize,
    max_bytes: usize,
    max_entries: usize,
}

impl GopCache {
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            total_bytes: 0,
            max_bytes,
            max_entries,
        }
    }

    /// Append a frame, evicting the oldest entries if a bound is exceeded
    ///
    /// The cache keeps the handle it is given (one claim). Key-frame
    /// clearing is the broadcaster's responsibility, not the cache's.
    pub fn add(&mut self, media_type: MediaType, timestamp: u32, payload: SharedBuffer) {
        self.total_bytes += payload.len();
        self.entries.push_back(GopEntry {
            media_type,
            timestamp,
            payload,
        });

        while self.total_bytes > self.max_bytes || self.entries.len() > self.max_entries {
            match self.entries.pop_front() {
                Some(old) => self.total_bytes -= old.payload.len(),
                None => break,
            }
        }
    }

    /// Snapshot the cached frames in arrival order
    ///
    /// Each returned entry carries a fresh claim; the cache keeps its own.
    pub fn get(&self) -> Vec<GopEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Drop every cached frame and its claim
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
