//! Audio-master playback clock

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use super::types::Timestamp;

/// Audio presentation clock shared between the sink writer and the tick thread.
///
/// The writer is the only party that advances it, from the sink's reported
/// playback position after each completed write. Readers tolerate a slightly
/// stale value, the sync tolerance window absorbs it, so plain relaxed atomics
/// are enough.
///
/// The clock never moves backwards within a session: a sink position lower
/// than the current value is ignored.
#[derive(Clone, Default)]
pub struct PlaybackClock {
    position_us: Arc<AtomicI64>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current audio position
    pub fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros())
    }

    pub fn micros(&self) -> i64 {
        self.position_us.load(Ordering::Relaxed)
    }

    /// Advance to `micros`, returning the clock value after the update
    pub fn advance_to(&self, micros: i64) -> i64 {
        let previous = self.position_us.fetch_max(micros, Ordering::Relaxed);
        previous.max(micros)
    }

    /// Back to zero for a new session
    pub fn reset(&self) {
        self.position_us.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("position", &self.now())
            .finish()
    }
}
