//! State shared between the decode thread and the tick thread for one session

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::frame_queue::FrameQueue;
use super::health::PlaybackHealth;
use super::types::{AudioChunk, VideoFrame};
use crate::error::PlayerError;
use crate::utils::sos::SignalOfStop;

/// Everything that crosses the decode/tick thread boundary.
///
/// Created on `play()` from stopped and dropped on `stop()`; never reused
/// across sessions.
pub struct Session {
    pub video: FrameQueue<VideoFrame>,
    pub audio: FrameQueue<AudioChunk>,
    pub signal: SignalOfStop,
    pub health: Arc<PlaybackHealth>,
    decoder_complete: AtomicBool,
    finished: AtomicBool,
    fatal: Mutex<Option<PlayerError>>,
}

impl Session {
    pub fn new(health: Arc<PlaybackHealth>) -> Self {
        Self {
            video: FrameQueue::new(),
            audio: FrameQueue::new(),
            signal: SignalOfStop::new(),
            health,
            decoder_complete: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            fatal: Mutex::new(None),
        }
    }

    /// All packets have been read and decoded
    pub fn is_decoder_complete(&self) -> bool {
        self.decoder_complete.load(Ordering::Acquire)
    }

    pub fn mark_decoder_complete(&self) {
        self.decoder_complete.store(true, Ordering::Release);
    }

    /// The decode thread has released its context and exited its loop
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Record a fatal error for the tick thread to surface; the first one wins
    pub fn fail(&self, error: PlayerError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub fn take_fatal(&self) -> Option<PlayerError> {
        self.fatal.lock().take()
    }

    /// Both queues are empty
    pub fn is_drained(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(PlaybackHealth::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fatal_error_wins() {
        let session = Session::default();
        session.fail(PlayerError::NoVideoStream);
        session.fail(PlayerError::NoAudioStream);
        assert!(matches!(session.take_fatal(), Some(PlayerError::NoVideoStream)));
        assert!(session.take_fatal().is_none());
    }
}
