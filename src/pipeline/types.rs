//! Core types for the playback pipeline

use bytes::Bytes;
use std::time::Duration;

/// Timestamp representation for decoded media units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Microseconds since stream start
    pub micros: i64,
}

impl Timestamp {
    /// Create a new timestamp from microseconds
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// Absolute difference between two timestamps
    pub fn diff(&self, other: Timestamp) -> Duration {
        Duration::from_micros(self.micros.abs_diff(other.micros))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Kind of media carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Anything that carries a presentation timestamp.
pub trait Timed {
    fn timestamp(&self) -> Timestamp;
}

/// Decoded video frame with raw pixel data.
///
/// Pixels are packed BGR24 rows unless the decode boundary documents otherwise.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub image: Bytes,
    pub width: u32,
    pub height: u32,
    pub timestamp: Timestamp,
}

impl VideoFrame {
    pub fn new(image: impl Into<Bytes>, width: u32, height: u32, timestamp: Timestamp) -> Self {
        Self {
            image: image.into(),
            width,
            height,
            timestamp,
        }
    }

    /// Get the size of the pixel data in bytes
    pub fn size(&self) -> usize {
        self.image.len()
    }
}

impl Timed for VideoFrame {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("timestamp", &self.timestamp)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.size())
            .finish()
    }
}

/// Block of decoded audio, raw interleaved PCM in the sink's [`AudioFormat`].
#[derive(Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Bytes,
    pub timestamp: Timestamp,
}

impl AudioChunk {
    pub fn new(samples: impl Into<Bytes>, timestamp: Timestamp) -> Self {
        Self {
            samples: samples.into(),
            timestamp,
        }
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}

impl Timed for AudioChunk {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunk")
            .field("timestamp", &self.timestamp)
            .field("size", &self.size())
            .finish()
    }
}

/// PCM layout shared by the audio decoder output and the audio sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bits per sample; samples are signed little-endian integers
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Signed 16-bit interleaved PCM
    pub fn s16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Size in bytes of one frame (one sample per channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Whole-frame byte count covering `micros` of playback
    pub fn bytes_for_micros(&self, micros: i64) -> usize {
        let frames = micros.max(0) as u64 * self.sample_rate as u64 / 1_000_000;
        frames as usize * self.bytes_per_frame()
    }

    /// Playback duration of `bytes` of PCM in this format, in microseconds
    pub fn micros_for_bytes(&self, bytes: usize) -> i64 {
        let frame = self.bytes_per_frame();
        if frame == 0 || self.sample_rate == 0 {
            return 0;
        }
        let frames = (bytes / frame) as i64;
        frames * 1_000_000 / self.sample_rate as i64
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/s{}le",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
