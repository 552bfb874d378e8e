//! Audio-master A/V sync gate
//!
//! Runs once per presentation tick. The audio clock is the reference: a video
//! frame is due once its timestamp is at most `tolerance` ahead of the clock.
//!
//! # Algorithm
//!
//! 1. If the head video frame is due, dequeue it for presentation. At most one
//!    frame per tick; a frame ahead of audio stays queued.
//! 2. Drain the audio queue completely into the sink writer. Audio is never
//!    held back by the tolerance window; the device write paces it.
//! 3. If both queues are empty and decoding is complete, wake the decode
//!    thread's drain wait and report playback complete.
//!
//! Late frames are never dropped: when video lags audio the backlog is shown
//! one frame per tick.

use log::debug;

use super::clock::PlaybackClock;
use super::frame_queue::FrameQueue;
use super::session::Session;
use super::types::{AudioChunk, VideoFrame};
use crate::config::PlayerConfig;

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Frame released for presentation this tick
    pub released: Option<VideoFrame>,
    /// Audio chunks handed to the sink writer
    pub audio_submitted: usize,
    /// Both queues empty after end of stream
    pub complete: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncGate {
    tolerance_us: i64,
}

impl SyncGate {
    pub fn new(config: &PlayerConfig) -> Self {
        Self::with_tolerance(config.sync_tolerance_us)
    }

    pub fn with_tolerance(tolerance_us: i64) -> Self {
        Self { tolerance_us }
    }

    pub fn tolerance_us(&self) -> i64 {
        self.tolerance_us
    }

    /// A frame at `frame_us` is due against an audio clock at `clock_us`
    pub fn is_due(&self, frame_us: i64, clock_us: i64) -> bool {
        frame_us <= clock_us.saturating_add(self.tolerance_us)
    }

    /// Dequeue the head frame if it is due
    pub fn release_video(&self, video: &FrameQueue<VideoFrame>, clock_us: i64) -> Option<VideoFrame> {
        video
            .dequeue_if(|frame| self.is_due(frame.timestamp.micros, clock_us))
            .ok()
            .flatten()
    }

    /// Hand every buffered audio chunk to `submit`, in order
    pub fn drain_audio(&self, audio: &FrameQueue<AudioChunk>, mut submit: impl FnMut(AudioChunk)) -> usize {
        let mut submitted = 0;
        while let Ok(chunk) = audio.dequeue() {
            submit(chunk);
            submitted += 1;
        }
        submitted
    }

    /// One presentation tick against `session`.
    pub fn tick(
        &self,
        session: &Session,
        clock: &PlaybackClock,
        submit: impl FnMut(AudioChunk),
    ) -> TickOutcome {
        let released = self.release_video(&session.video, clock.micros());
        let audio_submitted = self.drain_audio(&session.audio, submit);

        let complete = session.is_decoder_complete() && session.is_drained();
        if complete {
            debug!("SyncGate: queues drained after end of stream");
            session.signal.notify_drained();
        }

        TickOutcome {
            released,
            audio_submitted,
            complete,
        }
    }
}

impl Default for SyncGate {
    fn default() -> Self {
        Self::new(&PlayerConfig::default())
    }
}
