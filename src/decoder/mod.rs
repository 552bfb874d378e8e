//! Decode boundary and the background decoder adapter
//!
//! Demuxing and codec work live behind [`DecodeBoundary`] / [`DecodeContext`].
//! The adapter drives a context on its own thread and fills the session
//! queues; see [`adapter`].

pub mod adapter;
pub mod synthetic;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

use anyhow::Result;
use bytes::Bytes;

use crate::error::PlayerError;
use crate::pipeline::{AudioChunk, AudioFormat, MediaKind, Timestamp, VideoFrame};

/// Something that can be opened into a fresh decode context, e.g. a file.
///
/// Opened once per playback session.
pub trait DecodeBoundary: Send {
    /// Human-readable name of the source, for logs
    fn describe(&self) -> String;

    fn open_stream(&mut self) -> Result<Box<dyn DecodeContext>>;
}

/// An opened container with its decoders.
pub trait DecodeContext: Send {
    /// Audio and video streams in container order
    fn streams(&self) -> Vec<StreamDescriptor>;

    /// Prepare decoders for the chosen streams; returns the PCM layout the
    /// audio decoder will produce.
    fn open_decoders(
        &mut self,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
    ) -> Result<AudioFormat>;

    /// Next compressed packet, `None` at end of stream
    fn read_next_packet(&mut self) -> Result<Option<Packet>>;

    /// Decode from `offset` within a video packet.
    fn decode_video(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<VideoFrame>>;

    /// Decode from `offset` within an audio packet.
    fn decode_audio(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<AudioChunk>>;

    /// Drain whatever the decoders still hold once input has run out.
    ///
    /// Called once, after `read_next_packet` returned `None`. Decoders that
    /// never hold units back can keep the default.
    fn finish(&mut self) -> Result<Flushed> {
        Ok(Flushed::default())
    }

    fn close(&mut self) -> Result<()>;
}

/// Units released by [`DecodeContext::finish`], in decode order.
#[derive(Debug, Default)]
pub struct Flushed {
    pub video: Vec<VideoFrame>,
    pub audio: Vec<AudioChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
}

/// A compressed unit belonging to one stream.
#[derive(Debug, Clone)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Bytes,
    pub pts: Option<Timestamp>,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Bytes>, pts: Option<Timestamp>) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Result of one decode pass.
///
/// Decoders may consume input without completing a unit yet; callers keep
/// advancing the offset by `consumed` until the packet is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub consumed: usize,
    pub unit: Option<T>,
}

impl<T> Decoded<T> {
    pub fn partial(consumed: usize) -> Self {
        Self {
            consumed,
            unit: None,
        }
    }

    pub fn complete(consumed: usize, unit: T) -> Self {
        Self {
            consumed,
            unit: Some(unit),
        }
    }
}

/// The streams a session plays, resolved once at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMap {
    pub video: StreamDescriptor,
    pub audio: StreamDescriptor,
}

impl StreamMap {
    /// Pick the first video and the first audio stream.
    pub fn discover(streams: &[StreamDescriptor]) -> Result<Self, PlayerError> {
        let first = |kind| streams.iter().copied().find(|s| s.kind == kind);
        let video = first(MediaKind::Video).ok_or(PlayerError::NoVideoStream)?;
        let audio = first(MediaKind::Audio).ok_or(PlayerError::NoAudioStream)?;
        Ok(Self { video, audio })
    }

    /// Which decode path a packet belongs to; `None` for streams not played
    pub fn route(&self, stream_index: usize) -> Option<MediaKind> {
        if stream_index == self.video.index {
            Some(MediaKind::Video)
        } else if stream_index == self.audio.index {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}
