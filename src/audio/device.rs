//! Platform audio output via cpal
//!
//! Decoded s16 PCM is handed to the device callback through a bounded sample
//! buffer. `write` blocks while the buffer is full, which is what paces the
//! sink writer in real time; the callback's consumed-frame count is the sink
//! position.

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{AudioOutput, AudioSink};
use crate::pipeline::AudioFormat;

/// Buffered audio ahead of the device (~100ms at 48kHz stereo)
const MAX_BUFFER_SAMPLES: usize = 9600;
const I16_TO_F32: f32 = 1.0 / 32768.0;

/// Opens sinks on the host's default output device.
#[derive(Default)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, format: &AudioFormat) -> Result<Box<dyn AudioSink>> {
        if format.bits_per_sample != 16 {
            return Err(anyhow!("unsupported sample width {}", format.bits_per_sample));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output audio device"))?;
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: format.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SharedBuffer::default());
        let played_frames = Arc::new(AtomicU64::new(0));
        let channels = format.channels.max(1) as usize;

        let stream = {
            let shared = shared.clone();
            let played_frames = played_frames.clone();
            device.build_output_stream(
                &config,
                move |output: &mut [f32], _| {
                    let mut samples = shared.samples.lock();
                    let mut taken = 0usize;
                    for out in output.iter_mut() {
                        match samples.pop_front() {
                            Some(s) => {
                                *out = s as f32 * I16_TO_F32;
                                taken += 1;
                            }
                            None => *out = 0.0,
                        }
                    }
                    drop(samples);
                    played_frames.fetch_add((taken / channels) as u64, Ordering::Relaxed);
                    shared.space.notify_all();
                },
                |err| error!("Audio output error: {}", err),
                None,
            )?
        };
        stream.play()?;
        info!("CpalOutput: opened {} on default device", format);

        Ok(Box::new(CpalSink {
            format: *format,
            shared,
            played_frames,
            _stream: stream,
        }))
    }
}

#[derive(Default)]
struct SharedBuffer {
    samples: Mutex<VecDeque<i16>>,
    space: Condvar,
}

struct CpalSink {
    format: AudioFormat,
    shared: Arc<SharedBuffer>,
    played_frames: Arc<AtomicU64>,
    _stream: cpal::Stream, // kept alive
}

// The stream handle is only held to keep the callback alive; it is never used
// from another thread.
unsafe impl Send for CpalSink {}

impl AudioSink for CpalSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut incoming = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .peekable();

        while incoming.peek().is_some() {
            let mut samples = self.shared.samples.lock();
            while samples.len() >= MAX_BUFFER_SAMPLES {
                // A device that stopped pulling samples fails the write
                if self
                    .shared
                    .space
                    .wait_for(&mut samples, Duration::from_secs(2))
                    .timed_out()
                    && samples.len() >= MAX_BUFFER_SAMPLES
                {
                    return Err(anyhow!("audio device stopped consuming samples"));
                }
            }
            let room = MAX_BUFFER_SAMPLES - samples.len();
            samples.extend(incoming.by_ref().take(room));
        }
        Ok(())
    }

    fn position_micros(&self) -> i64 {
        let frames = self.played_frames.load(Ordering::Relaxed) as i64;
        frames * 1_000_000 / self.format.sample_rate.max(1) as i64
    }

    fn close(&mut self) -> Result<()> {
        // Drain: wait until the callback has consumed what is buffered
        let mut samples = self.shared.samples.lock();
        while !samples.is_empty() {
            if self
                .shared
                .space
                .wait_for(&mut samples, Duration::from_millis(500))
                .timed_out()
            {
                samples.clear();
            }
        }
        Ok(())
    }
}
