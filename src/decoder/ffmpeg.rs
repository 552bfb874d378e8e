//! FFmpeg-backed decode boundary
//!
//! Demuxes a media file with ac-ffmpeg, decodes the first video and audio
//! streams and converts their output to what the pipeline expects: packed
//! BGR24 frames and interleaved signed 16-bit PCM at the stream's sample rate.
//!
//! FFmpeg decoders take whole packets. The first pass over a packet pushes it
//! and collects every frame it yields; following passes hand those frames out
//! one by one, and the packet counts as consumed once the last one is out.
//! At end of input the decoders and the resampler are flushed so frames held
//! back for reordering or resampling still reach the queues.

use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::audio::frame::get_sample_format;
use ac_ffmpeg::codec::audio::resampler::AudioResampler;
use ac_ffmpeg::codec::audio::{AudioDecoder, ChannelLayout};
use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::VideoFrameScaler;
use ac_ffmpeg::codec::video::VideoDecoder;
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use std::collections::VecDeque;
use std::fs::File;
use std::path::PathBuf;

use super::{DecodeBoundary, DecodeContext, Decoded, Flushed, Packet, StreamDescriptor};
use crate::pipeline::{AudioChunk, AudioFormat, MediaKind, Timestamp, VideoFrame};

/// Output PCM channel count; everything is down/up-mixed to stereo
const OUTPUT_CHANNELS: u32 = 2;

/// A media file opened through FFmpeg.
pub struct FfmpegSource {
    path: PathBuf,
}

impl FfmpegSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DecodeBoundary for FfmpegSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open_stream(&mut self) -> Result<Box<dyn DecodeContext>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let io = IO::from_seekable_read_stream(file);
        let demuxer = Demuxer::builder()
            .build(io)?
            .find_stream_info(None)
            .map_err(|(_, e)| e)?;

        info!(
            "FfmpegSource: opened {} ({} streams)",
            self.path.display(),
            demuxer.streams().len()
        );
        Ok(Box::new(FfmpegContext {
            demuxer: Some(demuxer),
            current: None,
            video: None,
            audio: None,
        }))
    }
}

struct VideoPath {
    decoder: VideoDecoder,
    scaler: Option<VideoFrameScaler>,
    ready: VecDeque<VideoFrame>,
}

struct AudioPath {
    decoder: AudioDecoder,
    resampler: AudioResampler,
    format: AudioFormat,
    ready: VecDeque<AudioChunk>,
}

struct FfmpegContext {
    demuxer: Option<DemuxerWithStreamInfo<File>>,
    /// Last packet read, pushed to its decoder on the first pass
    current: Option<ac_ffmpeg::packet::Packet>,
    video: Option<VideoPath>,
    audio: Option<AudioPath>,
}

// FFmpeg contexts are only ever touched by the thread that owns the context
unsafe impl Send for FfmpegContext {}

impl FfmpegContext {
    fn demuxer(&mut self) -> Result<&mut DemuxerWithStreamInfo<File>> {
        self.demuxer.as_mut().ok_or_else(|| anyhow!("source already closed"))
    }

    fn take_packet(&mut self, packet: &Packet) -> ac_ffmpeg::packet::Packet {
        match self.current.take() {
            Some(raw) => raw,
            None => {
                let mut raw = ac_ffmpeg::packet::PacketMut::from(&packet.data[..]);
                if let Some(pts) = packet.pts {
                    raw = raw.with_pts(ac_ffmpeg::time::Timestamp::from_micros(pts.micros));
                }
                raw.freeze()
            }
        }
    }
}

fn micros_of(pts: ac_ffmpeg::time::Timestamp, fallback: Option<Timestamp>) -> Timestamp {
    pts.as_micros()
        .map(Timestamp::from_micros)
        .or(fallback)
        .unwrap_or_default()
}

/// Hand out one buffered unit; the packet is consumed once the buffer is empty
fn next_unit<T>(ready: &mut VecDeque<T>, remaining: usize) -> Decoded<T> {
    match ready.pop_front() {
        Some(unit) if ready.is_empty() => Decoded::complete(remaining, unit),
        Some(unit) => Decoded::complete(0, unit),
        None => Decoded::partial(remaining),
    }
}

impl VideoPath {
    fn convert(
        &mut self,
        frame: &ac_ffmpeg::codec::video::VideoFrame,
        fallback: Option<Timestamp>,
    ) -> Result<VideoFrame> {
        let (width, height) = (frame.width(), frame.height());
        if self.scaler.is_none() {
            let scaler = VideoFrameScaler::builder()
                .source_pixel_format(frame.pixel_format())
                .source_width(width)
                .source_height(height)
                .target_pixel_format(get_pixel_format("bgr24"))
                .target_width(width)
                .target_height(height)
                .build()?;
            self.scaler = Some(scaler);
        }
        let scaler = self.scaler.as_mut().ok_or_else(|| anyhow!("no scaler"))?;
        let bgr = scaler.scale(frame)?;

        let planes = bgr.planes();
        let plane = &planes[0];
        let (stride, row) = (plane.line_size(), width * 3);
        let mut image = Vec::with_capacity(row * height);
        for r in 0..height {
            let start = r * stride;
            let Some(line) = plane.data().get(start..start + row) else {
                break;
            };
            image.extend_from_slice(line);
        }

        Ok(VideoFrame::new(
            image,
            width as u32,
            height as u32,
            micros_of(frame.pts(), fallback),
        ))
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        self.decoder.flush()?;
        while let Some(frame) = self.decoder.take()? {
            let converted = self.convert(&frame, None)?;
            self.ready.push_back(converted);
        }
        Ok(self.ready.drain(..).collect())
    }
}

impl AudioPath {
    fn drain(&mut self, fallback: Option<Timestamp>) -> Result<()> {
        while let Some(frame) = self.decoder.take()? {
            self.resampler.push(frame)?;
            self.take_pcm(fallback)?;
        }
        Ok(())
    }

    fn take_pcm(&mut self, fallback: Option<Timestamp>) -> Result<()> {
        while let Some(pcm) = self.resampler.take()? {
            let bytes = pcm.samples() * self.format.bytes_per_frame();
            let planes = pcm.planes();
            let data = planes[0].data();
            let samples = &data[..bytes.min(data.len())];
            self.ready
                .push_back(AudioChunk::new(samples.to_vec(), micros_of(pcm.pts(), fallback)));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<AudioChunk>> {
        self.decoder.flush()?;
        self.drain(None)?;
        self.resampler.flush()?;
        self.take_pcm(None)?;
        Ok(self.ready.drain(..).collect())
    }
}

impl DecodeContext for FfmpegContext {
    fn streams(&self) -> Vec<StreamDescriptor> {
        let Some(demuxer) = &self.demuxer else {
            return Vec::new();
        };
        demuxer
            .streams()
            .iter()
            .enumerate()
            .filter_map(|(index, stream)| {
                let params = stream.codec_parameters();
                let kind = if params.is_video_codec() {
                    MediaKind::Video
                } else if params.is_audio_codec() {
                    MediaKind::Audio
                } else {
                    return None;
                };
                Some(StreamDescriptor { index, kind })
            })
            .collect()
    }

    fn open_decoders(
        &mut self,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
    ) -> Result<AudioFormat> {
        let demuxer = self.demuxer()?;
        let streams = demuxer.streams();
        let video_stream = streams
            .get(video.index)
            .ok_or_else(|| anyhow!("no stream {}", video.index))?;
        let audio_stream = streams
            .get(audio.index)
            .ok_or_else(|| anyhow!("no stream {}", audio.index))?;

        let video_decoder = VideoDecoder::from_stream(video_stream)?.build()?;
        let audio_decoder = AudioDecoder::from_stream(audio_stream)?.build()?;

        let params = audio_stream.codec_parameters();
        let audio_params = params
            .as_audio_codec_parameters()
            .ok_or_else(|| anyhow!("stream {} is not audio", audio.index))?;
        let sample_rate = audio_params.sample_rate();
        let target_layout = ChannelLayout::from_channels(OUTPUT_CHANNELS)
            .ok_or_else(|| anyhow!("no layout for {} channels", OUTPUT_CHANNELS))?;

        let resampler = AudioResampler::builder()
            .source_channel_layout(audio_params.channel_layout().to_owned())
            .source_sample_format(audio_params.sample_format())
            .source_sample_rate(sample_rate)
            .target_channel_layout(target_layout)
            .target_sample_format(get_sample_format("s16"))
            .target_sample_rate(sample_rate)
            .build()?;

        let format = AudioFormat::s16(sample_rate, OUTPUT_CHANNELS as u16);
        debug!(
            "FfmpegSource: decoders ready (video #{}, audio #{} -> {})",
            video.index, audio.index, format
        );

        self.video = Some(VideoPath {
            decoder: video_decoder,
            scaler: None,
            ready: VecDeque::new(),
        });
        self.audio = Some(AudioPath {
            decoder: audio_decoder,
            resampler,
            format,
            ready: VecDeque::new(),
        });
        Ok(format)
    }

    fn read_next_packet(&mut self) -> Result<Option<Packet>> {
        let Some(raw) = self.demuxer()?.take()? else {
            return Ok(None);
        };
        let pts = raw.pts().as_micros().map(Timestamp::from_micros);
        let packet = Packet::new(raw.stream_index(), raw.data().to_vec(), pts);
        self.current = Some(raw);
        Ok(Some(packet))
    }

    fn decode_video(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<VideoFrame>> {
        if offset == 0 {
            let raw = self.take_packet(packet);
            let path = self.video.as_mut().ok_or_else(|| anyhow!("video decoder not open"))?;
            path.decoder.push(raw)?;
            while let Some(frame) = path.decoder.take()? {
                let converted = path.convert(&frame, packet.pts)?;
                path.ready.push_back(converted);
            }
        }
        let path = self.video.as_mut().ok_or_else(|| anyhow!("video decoder not open"))?;
        Ok(next_unit(&mut path.ready, packet.size() - offset))
    }

    fn decode_audio(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<AudioChunk>> {
        if offset == 0 {
            let raw = self.take_packet(packet);
            let path = self.audio.as_mut().ok_or_else(|| anyhow!("audio decoder not open"))?;
            path.decoder.push(raw)?;
            path.drain(packet.pts)?;
        }
        let path = self.audio.as_mut().ok_or_else(|| anyhow!("audio decoder not open"))?;
        Ok(next_unit(&mut path.ready, packet.size() - offset))
    }

    fn finish(&mut self) -> Result<Flushed> {
        let mut flushed = Flushed::default();
        if let Some(path) = self.video.as_mut() {
            flushed.video = path.flush()?;
        }
        if let Some(path) = self.audio.as_mut() {
            flushed.audio = path.flush()?;
        }
        debug!(
            "FfmpegSource: flushed {} video frames and {} audio chunks",
            flushed.video.len(),
            flushed.audio.len()
        );
        Ok(flushed)
    }

    fn close(&mut self) -> Result<()> {
        self.video = None;
        self.audio = None;
        self.current = None;
        if self.demuxer.take().is_some() {
            debug!("FfmpegSource: closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_units_consume_packet_with_the_last() {
        let mut ready: VecDeque<u32> = VecDeque::from(vec![1, 2]);
        assert_eq!(next_unit(&mut ready, 100), Decoded::complete(0, 1));
        assert_eq!(next_unit(&mut ready, 100), Decoded::complete(100, 2));
        assert_eq!(next_unit(&mut ready, 100), Decoded::partial(100));
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let mut source = FfmpegSource::new("/nonexistent/clip.mp4");
        assert!(source.open_stream().is_err());
    }
}
