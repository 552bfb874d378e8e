//! Playback diagnostics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one playback session
///
/// Written from the decode thread, the sink writer and the tick thread; all
/// fields are relaxed atomics.
#[derive(Default)]
pub struct PlaybackHealth {
    /// Video frames pushed into the video queue
    pub frames_decoded: AtomicU64,

    /// Audio chunks pushed into the audio queue
    pub chunks_decoded: AtomicU64,

    /// Video frames released to presentation
    pub frames_presented: AtomicU64,

    /// Audio chunks fully written to the sink
    pub chunks_written: AtomicU64,

    /// Audio chunks whose write failed
    pub write_failures: AtomicU64,

    /// Pacing sleeps taken by the decode thread
    pub pacing_sleeps: AtomicU64,

    /// Total time spent in pacing sleeps (microseconds)
    pub pacing_sleep_us: AtomicU64,
}

impl PlaybackHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoded_frame(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoded_chunk(&self) {
        self.chunks_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self) {
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pacing_sleep(&self, micros: u64) {
        self.pacing_sleeps.fetch_add(1, Ordering::Relaxed);
        self.pacing_sleep_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::Relaxed)
    }

    pub fn pacing_sleeps(&self) -> u64 {
        self.pacing_sleeps.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            chunks_decoded: self.chunks_decoded.load(Ordering::Relaxed),
            frames_presented: self.frames_presented(),
            chunks_written: self.chunks_written(),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            pacing_sleeps: self.pacing_sleeps(),
            pacing_sleep_us: self.pacing_sleep_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of health counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub frames_decoded: u64,
    pub chunks_decoded: u64,
    pub frames_presented: u64,
    pub chunks_written: u64,
    pub write_failures: u64,
    pub pacing_sleeps: u64,
    pub pacing_sleep_us: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: video {}/{} presented, audio {}/{} written ({} failed), {} pacing sleeps ({:.1}ms)",
            self.frames_presented,
            self.frames_decoded,
            self.chunks_written,
            self.chunks_decoded,
            self.write_failures,
            self.pacing_sleeps,
            self.pacing_sleep_us as f64 / 1000.0,
        )
    }
}

/// Point-in-time view of a player for diagnostics overlays and logs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Wall time accumulated from `update(dt)` while playing (microseconds)
    pub play_time_us: i64,
    /// Audio clock (microseconds)
    pub audio_ts_us: i64,
    /// Timestamp of the last presented video frame (microseconds)
    pub video_ts_us: i64,
    /// |video_ts - audio_ts| measured when the last frame was presented
    pub av_sync_us: i64,
    pub video_queued: usize,
    pub audio_queued: usize,
    pub health: HealthSummary,
}

impl std::fmt::Display for PlaybackStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "t={:.3}s audio={}µs video={}µs drift={}µs queued v={} a={} | {}",
            self.play_time_us as f64 / 1_000_000.0,
            self.audio_ts_us,
            self.video_ts_us,
            self.av_sync_us,
            self.video_queued,
            self.audio_queued,
            self.health,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_roll_into_summary() {
        let health = PlaybackHealth::new();
        health.record_decoded_frame();
        health.record_decoded_frame();
        health.record_presented();
        health.record_written();
        health.record_write_failure();
        health.record_pacing_sleep(10_000);

        let summary = health.summary();
        assert_eq!(summary.frames_decoded, 2);
        assert_eq!(summary.frames_presented, 1);
        assert_eq!(summary.chunks_written, 1);
        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.pacing_sleeps, 1);
        assert_eq!(summary.pacing_sleep_us, 10_000);
    }
}
