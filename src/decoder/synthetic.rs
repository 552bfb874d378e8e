//! In-memory decode boundary
//!
//! Produces a scripted schedule of video and audio packets without touching a
//! container or codec. Used by the demo binary when no real backend is built
//! in, and by the player tests to script timestamps, multi-pass packets and
//! failures.

use anyhow::{Result, anyhow};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{DecodeBoundary, DecodeContext, Decoded, Flushed, Packet, StreamDescriptor};
use crate::pipeline::{AudioChunk, AudioFormat, MediaKind, Timestamp, VideoFrame};

/// Bytes consumed by one decode pass
const PASS_BYTES: usize = 16;
const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;
const TONE_HZ: f32 = 440.0;

/// Where a scripted source should break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    OpenSource,
    OpenDecoders,
    /// `read_next_packet` fails once this many packets were read
    Read { after_packets: usize },
    /// The last pass of the `packet`-th (0-based) packet of `kind` fails
    Decode { kind: MediaKind, packet: usize },
    /// `finish` fails at end of stream
    Flush,
}

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub video_timestamps: Vec<i64>,
    pub audio_timestamps: Vec<i64>,
    pub width: u32,
    pub height: u32,
    pub audio_format: AudioFormat,
    /// Playback length of each audio chunk
    pub audio_chunk: Duration,
    /// Decode passes needed to consume one packet; only the last completes a unit
    pub passes_per_packet: usize,
    pub has_video: bool,
    pub has_audio: bool,
    /// The video decoder holds one frame back until the next packet or `finish`
    pub video_delay: bool,
    pub failure: Option<Failure>,
}

impl SyntheticSpec {
    /// Explicit timestamp schedules, in microseconds
    pub fn from_timestamps(video: &[i64], audio: &[i64]) -> Self {
        Self {
            video_timestamps: video.to_vec(),
            audio_timestamps: audio.to_vec(),
            width: 4,
            height: 2,
            audio_format: AudioFormat::s16(48_000, 2),
            audio_chunk: Duration::from_millis(20),
            passes_per_packet: 1,
            has_video: true,
            has_audio: true,
            video_delay: false,
            failure: None,
        }
    }

    /// A color-bar clip with a continuous tone
    pub fn test_pattern(duration: Duration, fps: u32, audio_chunk: Duration) -> Self {
        let total_us = duration.as_micros() as i64;
        let frame_us = 1_000_000 / fps.max(1) as i64;
        let chunk_us = (audio_chunk.as_micros() as i64).max(1);

        let video: Vec<i64> = (0..).map(|i| i * frame_us).take_while(|&t| t < total_us).collect();
        let audio: Vec<i64> = (0..).map(|i| i * chunk_us).take_while(|&t| t < total_us).collect();

        Self {
            width: 320,
            height: 180,
            audio_chunk,
            ..Self::from_timestamps(&video, &audio)
        }
    }

    pub fn with_passes(mut self, passes: usize) -> Self {
        self.passes_per_packet = passes.max(1);
        self
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_video_delay(mut self) -> Self {
        self.video_delay = true;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.has_video = false;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }
}

/// Counts of contexts opened and closed by a [`SyntheticSource`].
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ContextTracker {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct SyntheticSource {
    spec: SyntheticSpec,
    tracker: ContextTracker,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticSpec) -> Self {
        Self {
            spec,
            tracker: ContextTracker::default(),
        }
    }

    pub fn tracker(&self) -> ContextTracker {
        self.tracker.clone()
    }
}

impl DecodeBoundary for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} ({} video / {} audio packets)",
            self.spec.width,
            self.spec.height,
            self.spec.video_timestamps.len(),
            self.spec.audio_timestamps.len()
        )
    }

    fn open_stream(&mut self) -> Result<Box<dyn DecodeContext>> {
        if self.spec.failure == Some(Failure::OpenSource) {
            return Err(anyhow!("synthetic source refused to open"));
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticContext::new(self.spec.clone(), self.tracker.clone())))
    }
}

struct SyntheticContext {
    spec: SyntheticSpec,
    tracker: ContextTracker,
    schedule: Vec<(MediaKind, i64)>,
    next: usize,
    video_seen: usize,
    audio_seen: usize,
    held: Option<VideoFrame>,
    tone_phase: f32,
    closed: bool,
}

impl SyntheticContext {
    fn new(spec: SyntheticSpec, tracker: ContextTracker) -> Self {
        let mut schedule = Vec::new();
        if spec.has_video {
            schedule.extend(spec.video_timestamps.iter().map(|&t| (MediaKind::Video, t)));
        }
        if spec.has_audio {
            schedule.extend(spec.audio_timestamps.iter().map(|&t| (MediaKind::Audio, t)));
        }
        // Container interleaving: by timestamp, audio first on ties
        schedule.sort_by_key(|&(kind, t)| (t, kind == MediaKind::Video));

        Self {
            spec,
            tracker,
            schedule,
            next: 0,
            video_seen: 0,
            audio_seen: 0,
            held: None,
            tone_phase: 0.0,
            closed: false,
        }
    }

    /// Consume one pass; returns (consumed, last pass of the packet)
    fn pass(packet: &Packet, offset: usize) -> (usize, bool) {
        let consumed = PASS_BYTES.min(packet.size().saturating_sub(offset));
        (consumed, offset + consumed >= packet.size())
    }

    fn should_fail(&self, kind: MediaKind, index: usize) -> bool {
        self.spec.failure == Some(Failure::Decode { kind, packet: index })
    }

    fn color_bars(&self, frame_index: usize) -> Vec<u8> {
        const BARS: [[u8; 3]; 7] = [
            [255, 255, 255],
            [0, 255, 255],
            [255, 255, 0],
            [0, 255, 0],
            [255, 0, 255],
            [0, 0, 255],
            [255, 0, 0],
        ];
        let (w, h) = (self.spec.width as usize, self.spec.height as usize);
        let mut image = Vec::with_capacity(w * h * 3);
        for _ in 0..h {
            for x in 0..w {
                let bar = (x * BARS.len() / w.max(1) + frame_index) % BARS.len();
                image.extend_from_slice(&BARS[bar]);
            }
        }
        image
    }

    fn tone(&mut self) -> Vec<u8> {
        let format = self.spec.audio_format;
        let bytes = format.bytes_for_micros(self.spec.audio_chunk.as_micros() as i64);
        let frames = bytes / format.bytes_per_frame().max(1);
        let step = TONE_HZ * std::f32::consts::TAU / format.sample_rate.max(1) as f32;

        let mut pcm = Vec::with_capacity(bytes);
        for _ in 0..frames {
            let sample = (self.tone_phase.sin() * 0.2 * i16::MAX as f32) as i16;
            for _ in 0..format.channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
            self.tone_phase = (self.tone_phase + step) % std::f32::consts::TAU;
        }
        pcm
    }
}

impl DecodeContext for SyntheticContext {
    fn streams(&self) -> Vec<StreamDescriptor> {
        let mut streams = Vec::new();
        if self.spec.has_video {
            streams.push(StreamDescriptor {
                index: VIDEO_STREAM,
                kind: MediaKind::Video,
            });
        }
        if self.spec.has_audio {
            streams.push(StreamDescriptor {
                index: AUDIO_STREAM,
                kind: MediaKind::Audio,
            });
        }
        streams
    }

    fn open_decoders(
        &mut self,
        _video: &StreamDescriptor,
        _audio: &StreamDescriptor,
    ) -> Result<AudioFormat> {
        if self.spec.failure == Some(Failure::OpenDecoders) {
            return Err(anyhow!("synthetic decoders unavailable"));
        }
        Ok(self.spec.audio_format)
    }

    fn read_next_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(Failure::Read { after_packets }) = self.spec.failure
            && self.next >= after_packets
        {
            return Err(anyhow!("synthetic read error after {} packets", self.next));
        }
        let Some(&(kind, ts)) = self.schedule.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let stream_index = match kind {
            MediaKind::Video => VIDEO_STREAM,
            MediaKind::Audio => AUDIO_STREAM,
        };
        let data = Bytes::from(vec![0u8; PASS_BYTES * self.spec.passes_per_packet]);
        Ok(Some(Packet::new(stream_index, data, Some(Timestamp::from_micros(ts)))))
    }

    fn decode_video(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<VideoFrame>> {
        if offset == 0 {
            self.video_seen += 1;
        }
        let index = self.video_seen.saturating_sub(1);
        let (consumed, last) = Self::pass(packet, offset);
        if !last {
            return Ok(Decoded::partial(consumed));
        }
        if self.should_fail(MediaKind::Video, index) {
            return Err(anyhow!("corrupt video packet {}", index));
        }

        let timestamp = packet.pts.unwrap_or_default();
        let frame = VideoFrame::new(
            self.color_bars(index),
            self.spec.width,
            self.spec.height,
            timestamp,
        );
        if !self.spec.video_delay {
            return Ok(Decoded::complete(consumed, frame));
        }
        Ok(match self.held.replace(frame) {
            Some(previous) => Decoded::complete(consumed, previous),
            None => Decoded::partial(consumed),
        })
    }

    fn decode_audio(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<AudioChunk>> {
        if offset == 0 {
            self.audio_seen += 1;
        }
        let index = self.audio_seen.saturating_sub(1);
        let (consumed, last) = Self::pass(packet, offset);
        if !last {
            return Ok(Decoded::partial(consumed));
        }
        if self.should_fail(MediaKind::Audio, index) {
            return Err(anyhow!("corrupt audio packet {}", index));
        }

        let timestamp = packet.pts.unwrap_or_default();
        Ok(Decoded::complete(consumed, AudioChunk::new(self.tone(), timestamp)))
    }

    fn finish(&mut self) -> Result<Flushed> {
        if self.spec.failure == Some(Failure::Flush) {
            return Err(anyhow!("synthetic decoder failed to drain"));
        }
        Ok(Flushed {
            video: self.held.take().into_iter().collect(),
            audio: Vec::new(),
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(context: &mut dyn DecodeContext) -> Vec<(usize, i64)> {
        let mut packets = Vec::new();
        while let Some(packet) = context.read_next_packet().unwrap() {
            packets.push((packet.stream_index, packet.pts.unwrap().micros));
        }
        packets
    }

    #[test]
    fn test_packets_interleave_by_timestamp() {
        let mut source = SyntheticSource::new(SyntheticSpec::from_timestamps(
            &[0, 15_000, 35_000],
            &[0, 20_000, 40_000],
        ));
        let mut context = source.open_stream().unwrap();
        assert_eq!(
            drain(context.as_mut()),
            vec![
                (AUDIO_STREAM, 0),
                (VIDEO_STREAM, 0),
                (VIDEO_STREAM, 15_000),
                (AUDIO_STREAM, 20_000),
                (VIDEO_STREAM, 35_000),
                (AUDIO_STREAM, 40_000),
            ]
        );
    }

    #[test]
    fn test_multi_pass_packet_completes_on_last_pass() {
        let mut source =
            SyntheticSource::new(SyntheticSpec::from_timestamps(&[0], &[]).with_passes(3));
        let mut context = source.open_stream().unwrap();
        let packet = context.read_next_packet().unwrap().unwrap();

        let first = context.decode_video(&packet, 0).unwrap();
        assert_eq!(first.consumed, PASS_BYTES);
        assert!(first.unit.is_none());
        let second = context.decode_video(&packet, PASS_BYTES).unwrap();
        assert!(second.unit.is_none());
        let third = context.decode_video(&packet, 2 * PASS_BYTES).unwrap();
        let frame = third.unit.unwrap();
        assert_eq!(frame.size(), 4 * 2 * 3);
    }

    #[test]
    fn test_video_delay_releases_previous_frame_and_flushes_the_last() {
        let mut source = SyntheticSource::new(
            SyntheticSpec::from_timestamps(&[0, 40_000], &[]).with_video_delay(),
        );
        let mut context = source.open_stream().unwrap();

        let first = context.read_next_packet().unwrap().unwrap();
        let decoded = context.decode_video(&first, 0).unwrap();
        assert_eq!(decoded.consumed, PASS_BYTES);
        assert!(decoded.unit.is_none());

        let second = context.read_next_packet().unwrap().unwrap();
        let frame = context.decode_video(&second, 0).unwrap().unit.unwrap();
        assert_eq!(frame.timestamp.micros, 0);

        assert!(context.read_next_packet().unwrap().is_none());
        let flushed = context.finish().unwrap();
        assert_eq!(flushed.video.len(), 1);
        assert_eq!(flushed.video[0].timestamp.micros, 40_000);
        assert!(flushed.audio.is_empty());
        assert!(context.finish().unwrap().video.is_empty());
    }

    #[test]
    fn test_test_pattern_schedule() {
        let spec = SyntheticSpec::test_pattern(Duration::from_millis(100), 25, Duration::from_millis(20));
        assert_eq!(spec.video_timestamps, vec![0, 40_000, 80_000]);
        assert_eq!(spec.audio_timestamps, vec![0, 20_000, 40_000, 60_000, 80_000]);
    }

    #[test]
    fn test_tone_chunk_length_matches_duration() {
        let mut source = SyntheticSource::new(SyntheticSpec::from_timestamps(&[], &[0]));
        let mut context = source.open_stream().unwrap();
        let packet = context.read_next_packet().unwrap().unwrap();
        let chunk = context.decode_audio(&packet, 0).unwrap().unit.unwrap();
        // 20ms of 48kHz stereo s16
        assert_eq!(chunk.size(), 960 * 4);
    }

    #[test]
    fn test_close_is_counted_once() {
        let mut source = SyntheticSource::new(SyntheticSpec::from_timestamps(&[0], &[0]));
        let tracker = source.tracker();
        let mut context = source.open_stream().unwrap();
        context.close().unwrap();
        context.close().unwrap();
        assert_eq!(tracker.opened(), 1);
        assert_eq!(tracker.closed(), 1);
    }
}
