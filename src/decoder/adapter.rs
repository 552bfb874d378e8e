//! Background decoder adapter
//!
//! Drains packets from a [`DecodeContext`] on a dedicated thread, routes each
//! by the stream map resolved at discovery, and pushes completed frames and
//! audio chunks into the session queues. Before every packet the pacing
//! controller may put the thread to sleep.
//!
//! At end of stream the adapter flushes the units the decoders held back,
//! marks the session decoder-complete and waits
//! on the drain signal until the tick thread has consumed everything (or a stop
//! arrives), then closes the context. A decode error ends the session: it is
//! stored for the tick thread and the context is closed immediately.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{DecodeContext, Packet, StreamMap};
use crate::error::PlayerError;
use crate::pipeline::{MediaKind, Pace, PacingController, Session};
use crate::utils::sos::Wake;

/// How an adapter run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeEnd {
    /// Every packet read and decoded
    EndOfStream,
    /// Stop requested while decoding or pacing
    Cancelled,
    /// Read or decode error; the error is on the session
    Failed,
}

pub struct DecoderAdapter {
    context: Box<dyn DecodeContext>,
    streams: StreamMap,
    session: Arc<Session>,
    pacer: PacingController,
    packets: u64,
}

impl DecoderAdapter {
    pub fn new(
        context: Box<dyn DecodeContext>,
        streams: StreamMap,
        session: Arc<Session>,
        pacer: PacingController,
    ) -> Self {
        Self {
            context,
            streams,
            session,
            pacer,
            packets: 0,
        }
    }

    /// Run the adapter on its own named thread.
    pub fn spawn(self, thread_name: &str) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                self.run();
            })
    }

    /// Decode until end of stream, wait for the drain, release the context.
    ///
    /// A fatal error is stored on the session rather than returned, so the
    /// tick thread can surface it.
    pub fn run(mut self) -> DecodeEnd {
        info!("DecoderAdapter: started");

        let end = match self.decode_all() {
            Ok(DecodeEnd::EndOfStream) => {
                info!("DecoderAdapter: decoding complete ({} packets)", self.packets);
                self.session.mark_decoder_complete();
                match self.session.signal.wait() {
                    Wake::Drained => {
                        info!("DecoderAdapter: output drained, playback complete");
                        DecodeEnd::EndOfStream
                    }
                    Wake::Cancelled => {
                        info!("DecoderAdapter: stopped while waiting for drain");
                        DecodeEnd::Cancelled
                    }
                }
            }
            Ok(end) => {
                info!("DecoderAdapter: stopped after {} packets", self.packets);
                end
            }
            Err(e) => {
                error!("DecoderAdapter: {} after {} packets", e, self.packets);
                self.session.fail(e);
                DecodeEnd::Failed
            }
        };

        if let Err(e) = self.context.close() {
            debug!("DecoderAdapter: context close failed: {}", e);
        }
        self.session.mark_finished();
        end
    }

    fn decode_all(&mut self) -> Result<DecodeEnd, PlayerError> {
        while let Some(packet) = self.context.read_next_packet().map_err(PlayerError::Read)? {
            if self.session.signal.cancelled() {
                return Ok(DecodeEnd::Cancelled);
            }
            self.packets += 1;

            let health = &self.session.health;
            let pace = self.pacer.pace(
                &self.session.video,
                &self.session.audio,
                &self.session.signal,
                |delay| health.record_pacing_sleep(delay.as_micros() as u64),
            );
            if pace == Pace::Interrupted {
                return Ok(DecodeEnd::Cancelled);
            }

            match self.streams.route(packet.stream_index) {
                Some(MediaKind::Video) => self.decode_video_packet(&packet)?,
                Some(MediaKind::Audio) => self.decode_audio_packet(&packet)?,
                None => debug!(
                    "DecoderAdapter: skipping packet of unplayed stream {}",
                    packet.stream_index
                ),
            }
        }
        self.flush()?;
        Ok(DecodeEnd::EndOfStream)
    }

    fn flush(&mut self) -> Result<(), PlayerError> {
        let flushed = self.context.finish().map_err(PlayerError::Flush)?;
        if !flushed.video.is_empty() || !flushed.audio.is_empty() {
            debug!(
                "DecoderAdapter: flushed {} video frames and {} audio chunks",
                flushed.video.len(),
                flushed.audio.len()
            );
        }
        for frame in flushed.video {
            self.session.health.record_decoded_frame();
            self.session.video.enqueue(frame);
        }
        for chunk in flushed.audio {
            self.session.health.record_decoded_chunk();
            self.session.audio.enqueue(chunk);
        }
        Ok(())
    }

    fn decode_video_packet(&mut self, packet: &Packet) -> Result<(), PlayerError> {
        let mut offset = 0;
        while offset < packet.size() {
            let decoded = self
                .context
                .decode_video(packet, offset)
                .map_err(|source| PlayerError::Decode {
                    kind: MediaKind::Video,
                    source,
                })?;
            let stalled = decoded.consumed == 0 && decoded.unit.is_none();
            offset += decoded.consumed;

            if let Some(frame) = decoded.unit {
                self.session.health.record_decoded_frame();
                self.session.video.enqueue(frame);
            }
            if stalled {
                warn!(
                    "DecoderAdapter: video decoder made no progress at {}/{} bytes, dropping rest of packet",
                    offset,
                    packet.size()
                );
                break;
            }
        }
        Ok(())
    }

    fn decode_audio_packet(&mut self, packet: &Packet) -> Result<(), PlayerError> {
        let mut offset = 0;
        while offset < packet.size() {
            let decoded = self
                .context
                .decode_audio(packet, offset)
                .map_err(|source| PlayerError::Decode {
                    kind: MediaKind::Audio,
                    source,
                })?;
            let stalled = decoded.consumed == 0 && decoded.unit.is_none();
            offset += decoded.consumed;

            if let Some(chunk) = decoded.unit {
                self.session.health.record_decoded_chunk();
                self.session.audio.enqueue(chunk);
            }
            if stalled {
                warn!(
                    "DecoderAdapter: audio decoder made no progress at {}/{} bytes, dropping rest of packet",
                    offset,
                    packet.size()
                );
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeBoundary;
    use crate::decoder::synthetic::{ContextTracker, Failure, SyntheticSource, SyntheticSpec};
    use std::time::{Duration, Instant};

    fn adapter_for(spec: SyntheticSpec) -> (DecoderAdapter, Arc<Session>, ContextTracker) {
        let mut source = SyntheticSource::new(spec);
        let tracker = source.tracker();
        let context = source.open_stream().unwrap();
        let streams = StreamMap::discover(&context.streams()).unwrap();
        let session = Arc::new(Session::default());
        let adapter = DecoderAdapter::new(
            context,
            streams,
            session.clone(),
            PacingController::default(),
        );
        (adapter, session, tracker)
    }

    fn wait_for(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_end_of_stream_waits_for_drain() {
        let (adapter, session, tracker) = adapter_for(SyntheticSpec::from_timestamps(
            &[0, 10_000, 20_000],
            &[0, 20_000],
        ));
        let handle = thread::spawn(move || adapter.run());

        wait_for("decoder complete", || session.is_decoder_complete());
        assert_eq!(session.video.count(), 3);
        assert_eq!(session.audio.count(), 2);
        // Still parked on the drain signal
        assert!(!session.is_finished());
        assert_eq!(tracker.closed(), 0);

        session.video.clear();
        session.audio.clear();
        session.signal.notify_drained();

        assert_eq!(handle.join().unwrap(), DecodeEnd::EndOfStream);
        assert!(session.is_finished());
        assert_eq!(tracker.closed(), 1);
        assert!(session.take_fatal().is_none());
    }

    #[test]
    fn test_multi_pass_packets_enqueue_each_unit_once() {
        let (adapter, session, _tracker) = adapter_for(
            SyntheticSpec::from_timestamps(&[0, 5_000], &[0, 5_000]).with_passes(3),
        );
        let handle = thread::spawn(move || adapter.run());

        wait_for("decoder complete", || session.is_decoder_complete());
        assert_eq!(session.video.count(), 2);
        assert_eq!(session.audio.count(), 2);
        assert_eq!(session.video.head_timestamp().unwrap().micros, 0);

        session.signal.cancel();
        assert_eq!(handle.join().unwrap(), DecodeEnd::Cancelled);
    }

    #[test]
    fn test_decode_error_mid_packet_is_fatal_without_partial_frame() {
        let (adapter, session, tracker) = adapter_for(
            SyntheticSpec::from_timestamps(&[0, 5_000, 10_000], &[])
                .with_passes(3)
                .with_failure(Failure::Decode {
                    kind: MediaKind::Video,
                    packet: 1,
                }),
        );

        assert_eq!(adapter.run(), DecodeEnd::Failed);
        // Only the frame before the corrupt packet made it through
        assert_eq!(session.video.count(), 1);
        assert_eq!(session.video.head_timestamp().unwrap().micros, 0);
        assert!(!session.is_decoder_complete());
        assert!(session.is_finished());
        assert_eq!(tracker.closed(), 1);
        assert!(matches!(
            session.take_fatal(),
            Some(PlayerError::Decode {
                kind: MediaKind::Video,
                ..
            })
        ));
    }

    #[test]
    fn test_held_back_frame_is_flushed_at_end_of_stream() {
        let (adapter, session, tracker) = adapter_for(
            SyntheticSpec::from_timestamps(&[0, 10_000, 20_000], &[0, 20_000])
                .with_video_delay(),
        );
        let handle = thread::spawn(move || adapter.run());

        wait_for("decoder complete", || session.is_decoder_complete());
        let mut shown = Vec::new();
        while let Ok(frame) = session.video.dequeue() {
            shown.push(frame.timestamp.micros);
        }
        assert_eq!(shown, vec![0, 10_000, 20_000]);
        assert_eq!(session.health.summary().frames_decoded, 3);
        assert_eq!(session.audio.count(), 2);

        session.audio.clear();
        session.signal.notify_drained();
        assert_eq!(handle.join().unwrap(), DecodeEnd::EndOfStream);
        assert_eq!(tracker.closed(), 1);
    }

    #[test]
    fn test_flush_error_is_fatal() {
        let (adapter, session, tracker) = adapter_for(
            SyntheticSpec::from_timestamps(&[0, 10_000], &[0])
                .with_video_delay()
                .with_failure(Failure::Flush),
        );

        assert_eq!(adapter.run(), DecodeEnd::Failed);
        // The held-back frame never arrives
        assert_eq!(session.video.count(), 1);
        assert!(!session.is_decoder_complete());
        assert!(session.is_finished());
        assert_eq!(tracker.closed(), 1);
        let err = session.take_fatal().unwrap();
        assert!(matches!(err, PlayerError::Flush(_)));
        assert!(!err.is_startup());
    }

    #[test]
    fn test_read_error_is_fatal() {
        let (adapter, session, tracker) = adapter_for(
            SyntheticSpec::from_timestamps(&[0, 5_000], &[0, 5_000])
                .with_failure(Failure::Read { after_packets: 2 }),
        );

        assert_eq!(adapter.run(), DecodeEnd::Failed);
        assert_eq!(session.video.count() + session.audio.count(), 2);
        assert!(matches!(session.take_fatal(), Some(PlayerError::Read(_))));
        assert_eq!(tracker.closed(), 1);
    }

    #[test]
    fn test_cancel_interrupts_pacing_sleep() {
        // Two buffered audio chunks and a 20ms video gap engage pacing
        // before the third video packet; nothing consumes, so it keeps sleeping.
        let (adapter, session, tracker) = adapter_for(SyntheticSpec::from_timestamps(
            &[0, 20_000, 40_000],
            &[0, 1],
        ));
        let handle = thread::spawn(move || adapter.run());

        wait_for("pacing sleep", || session.health.pacing_sleeps() >= 1);
        assert_eq!(session.video.count(), 2);

        session.signal.cancel();
        assert_eq!(handle.join().unwrap(), DecodeEnd::Cancelled);
        assert!(!session.is_decoder_complete());
        assert!(session.is_finished());
        assert_eq!(tracker.closed(), 1);
    }

    #[test]
    fn test_pacing_releases_when_video_is_consumed() {
        let (adapter, session, _tracker) = adapter_for(SyntheticSpec::from_timestamps(
            &[0, 20_000, 40_000],
            &[0, 1],
        ));
        let handle = thread::spawn(move || adapter.run());

        wait_for("pacing sleep", || session.health.pacing_sleeps() >= 1);
        session.video.dequeue().unwrap();

        wait_for("decoder complete", || session.is_decoder_complete());
        assert_eq!(session.video.count(), 2);

        session.video.clear();
        session.audio.clear();
        session.signal.notify_drained();
        assert_eq!(handle.join().unwrap(), DecodeEnd::EndOfStream);
    }
}
