//! Serialized audio sink writer
//!
//! A single dedicated worker takes chunks off a channel one at a time: chunk N
//! is fully written before chunk N+1 is looked at, so playback order is the
//! submission order. The blocking device write is what paces audio in real
//! time, and keeping it off the tick thread means a full device buffer never
//! stalls presentation.
//!
//! After every successful write the worker reads the sink position and
//! advances the [`PlaybackClock`], making it the clock's only writer.

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use super::AudioSink;
use crate::pipeline::{AudioChunk, PlaybackClock, PlaybackHealth};

pub struct AudioSinkWriter {
    tx: Option<mpsc::UnboundedSender<AudioChunk>>,
    worker: Option<JoinHandle<()>>,
    discard: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl AudioSinkWriter {
    /// Start the worker thread, handing it exclusive ownership of `sink`.
    pub fn spawn(
        sink: Box<dyn AudioSink>,
        clock: PlaybackClock,
        health: Arc<PlaybackHealth>,
        thread_name: &str,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<AudioChunk>();
        let discard = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = {
            let discard = discard.clone();
            let pending = pending.clone();
            thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || write_loop(sink, rx, clock, health, discard, pending))?
        };

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            discard,
            pending,
        })
    }

    /// Queue a chunk behind everything already submitted. Never blocks.
    pub fn submit(&self, chunk: AudioChunk) {
        let Some(tx) = &self.tx else {
            return;
        };
        self.pending.fetch_add(1, Ordering::Relaxed);
        if tx.send(chunk).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            warn!("AudioSinkWriter: worker gone, chunk dropped");
        }
    }

    /// Chunks submitted but not yet written
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Write out everything already submitted, then close the sink.
    pub fn finish(mut self) {
        self.join();
    }

    /// Drop everything not yet written, let the current write complete, then
    /// close the sink.
    pub fn shutdown(mut self) {
        self.discard.store(true, Ordering::Relaxed);
        self.join();
    }

    fn join(&mut self) {
        // Closing the channel ends the worker loop once it is empty
        self.tx.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("AudioSinkWriter: worker panicked");
        }
    }
}

impl Drop for AudioSinkWriter {
    fn drop(&mut self) {
        self.discard.store(true, Ordering::Relaxed);
        self.join();
    }
}

fn write_loop(
    mut sink: Box<dyn AudioSink>,
    mut rx: mpsc::UnboundedReceiver<AudioChunk>,
    clock: PlaybackClock,
    health: Arc<PlaybackHealth>,
    discard: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
) {
    info!("AudioSinkWriter: started");
    let mut discarded = 0u64;

    while let Some(chunk) = rx.blocking_recv() {
        if discard.load(Ordering::Relaxed) {
            discarded += 1;
            pending.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        match sink.write(&chunk.samples) {
            Ok(()) => {
                let now = clock.advance_to(sink.position_micros());
                health.record_written();
                debug!(
                    "AudioSinkWriter: wrote chunk {} ({} bytes), clock {}µs",
                    chunk.timestamp,
                    chunk.size(),
                    now
                );
            }
            Err(e) => {
                health.record_write_failure();
                warn!("AudioSinkWriter: write of chunk {} failed: {}", chunk.timestamp, e);
            }
        }
        pending.fetch_sub(1, Ordering::Relaxed);
    }

    if let Err(e) = sink.close() {
        debug!("AudioSinkWriter: close failed: {}", e);
    }
    info!(
        "AudioSinkWriter: finished ({} written, {} discarded)",
        health.chunks_written(),
        discarded
    );
}
