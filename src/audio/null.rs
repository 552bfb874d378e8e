//! Device-less audio output
//!
//! Accounts for written PCM as if a device had played it. In real-time mode a
//! write blocks for the playback duration of its bytes, which paces the writer
//! like a real line would; otherwise writes return immediately.

use anyhow::anyhow;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{AudioOutput, AudioSink};
use crate::pipeline::AudioFormat;

/// What a [`NullAudioOutput`] has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkActivity {
    pub opened: usize,
    pub closed: usize,
    pub writes: usize,
    pub bytes_written: usize,
    /// Sink position reported after each write, in write order
    pub positions: Vec<i64>,
}

/// Shared view into a [`NullAudioOutput`]'s activity.
#[derive(Debug, Clone, Default)]
pub struct NullSinkTracker {
    activity: Arc<Mutex<SinkActivity>>,
}

impl NullSinkTracker {
    pub fn snapshot(&self) -> SinkActivity {
        self.activity.lock().clone()
    }
}

pub struct NullAudioOutput {
    realtime: bool,
    available: bool,
    tracker: NullSinkTracker,
}

impl NullAudioOutput {
    /// Writes block for the playback duration of their bytes
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            available: true,
            tracker: NullSinkTracker::default(),
        }
    }

    /// Writes complete immediately
    pub fn instant() -> Self {
        Self {
            realtime: false,
            ..Self::realtime()
        }
    }

    /// Every `open` fails, as if no device were present
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::instant()
        }
    }

    pub fn tracker(&self) -> NullSinkTracker {
        self.tracker.clone()
    }
}

impl AudioOutput for NullAudioOutput {
    fn open(&mut self, format: &AudioFormat) -> anyhow::Result<Box<dyn AudioSink>> {
        if !self.available {
            return Err(anyhow!("no audio output device available"));
        }
        if format.bytes_per_frame() == 0 || format.sample_rate == 0 {
            return Err(anyhow!("unsupported audio format {}", format));
        }
        self.tracker.activity.lock().opened += 1;
        debug!("NullAudioOutput: opened {} sink", format);
        Ok(Box::new(NullSink {
            format: *format,
            realtime: self.realtime,
            bytes_played: 0,
            tracker: self.tracker.clone(),
        }))
    }
}

struct NullSink {
    format: AudioFormat,
    realtime: bool,
    bytes_played: usize,
    tracker: NullSinkTracker,
}

impl AudioSink for NullSink {
    fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        if self.realtime {
            let micros = self.format.micros_for_bytes(bytes.len());
            std::thread::sleep(Duration::from_micros(micros as u64));
        }
        self.bytes_played += bytes.len();

        let position = self.position_micros();
        let mut activity = self.tracker.activity.lock();
        activity.writes += 1;
        activity.bytes_written += bytes.len();
        activity.positions.push(position);
        Ok(())
    }

    fn position_micros(&self) -> i64 {
        self.format.micros_for_bytes(self.bytes_played)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.tracker.activity.lock().closed += 1;
        Ok(())
    }
}
