//! Audio output boundary and the serialized sink writer
//!
//! The platform device sits behind [`AudioOutput`] / [`AudioSink`]. One sink is
//! opened per playback session and owned exclusively by that session's
//! [`AudioSinkWriter`].

pub mod null;
pub mod writer;

#[cfg(feature = "cpal")]
pub mod device;

use crate::pipeline::AudioFormat;

/// Factory for audio sinks, e.g. the default output device.
pub trait AudioOutput: Send {
    /// Open a sink accepting PCM in `format`. Failure means no usable device.
    fn open(&mut self, format: &AudioFormat) -> anyhow::Result<Box<dyn AudioSink>>;
}

/// An opened output line.
pub trait AudioSink: Send {
    /// Write all of `bytes`, blocking until the device has accepted them.
    fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()>;

    /// Playback position of the line, in microseconds since it was opened.
    fn position_micros(&self) -> i64;

    /// Let queued audio finish and release the device.
    fn close(&mut self) -> anyhow::Result<()>;
}

#[cfg(feature = "cpal")]
pub use device::CpalOutput;
pub use null::{NullAudioOutput, NullSinkTracker};
pub use writer::AudioSinkWriter;
