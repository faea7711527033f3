//! Per-session statistics
//!
//! Counters are atomics so the read loop, the write task and the
//! broadcaster can all bump them without coordination. Snapshots are
//! plain copies for logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters for one connection
#[derive(Debug)]
pub struct SessionStats {
    pub started_at: Instant,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    audio_frames: AtomicU64,
    video_frames: AtomicU64,
    keyframes: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            messages_in: AtomicU64::new(0),
            messages_out: AtomicU64::new(0),
            audio_frames: AtomicU64::new(0),
            video_frames: AtomicU64::new(0),
            keyframes: AtomicU64::new(0),
        }
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_message_out(&self) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_audio_frame(&self) {
        self.audio_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_video_frame(&self, keyframe: bool) {
        self.video_frames.fetch_add(1, Ordering::Relaxed);
        if keyframe {
            self.keyframes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy of the counters at this moment
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            audio_frames: self.audio_frames.load(Ordering::Relaxed),
            video_frames: self.video_frames.load(Ordering::Relaxed),
            keyframes: self.keyframes.load(Ordering::Relaxed),
            duration_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a session's counters
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub audio_frames: u64,
    pub video_frames: u64,
    pub keyframes: u64,
    pub duration_secs: u64,
}

impl StatsSnapshot {
    /// Inbound bitrate estimate in bits per second
    pub fn bitrate_in(&self) -> u64 {
        if self.duration_secs == 0 {
            return 0;
        }
        self.bytes_in * 8 / self.duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = SessionStats::new();
        stats.add_bytes_in(100);
        stats.add_bytes_in(50);
        stats.add_message_in();
        stats.add_video_frame(true);
        stats.add_video_frame(false);
        stats.add_audio_frame();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_in, 150);
        assert_eq!(snap.messages_in, 1);
        assert_eq!(snap.video_frames, 2);
        assert_eq!(snap.keyframes, 1);
        assert_eq!(snap.audio_frames, 1);
    }
}
