//! Player state machine
//!
//! Owns the decode boundary and the audio output, and turns `play()` /
//! `pause()` / `stop()` / `update(dt)` from the host's render loop into
//! session lifecycles:
//!
//! - `play()` from stopped opens the source, resolves the first video and audio
//!   streams, opens decoders and the audio sink, then starts the sink writer
//!   and the decode thread.
//! - Each `update(dt)` surfaces a fatal decode error, paused or not. While
//!   playing it also runs one sync gate tick and stops the session once
//!   playback has completed and the decode thread has let go of its context.
//! - `stop()` tears the session down from any state.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::audio::{AudioOutput, AudioSinkWriter};
use crate::config::PlayerConfig;
use crate::decoder::adapter::DecoderAdapter;
use crate::decoder::{DecodeBoundary, DecodeContext, StreamMap};
use crate::display::Presentation;
use crate::error::{PlayerError, Result};
use crate::pipeline::{
    PacingController, PlayState, PlaybackClock, PlaybackHealth, PlaybackStats, Session, SyncGate,
    VideoFrame,
};

/// Per-session resources, created on `play()` from stopped.
struct ActiveSession {
    shared: Arc<Session>,
    gate: SyncGate,
    writer: Option<AudioSinkWriter>,
    decode_thread: Option<JoinHandle<()>>,
}

pub struct VideoPlayer {
    config: PlayerConfig,
    source: Box<dyn DecodeBoundary>,
    output: Box<dyn AudioOutput>,
    state: PlayState,
    session: Option<ActiveSession>,
    clock: PlaybackClock,
    health: Arc<PlaybackHealth>,
    presentation: Presentation,
    play_time_us: i64,
    av_sync_us: i64,
    playback_complete: bool,
    disposed: bool,
}

impl VideoPlayer {
    pub fn new(source: Box<dyn DecodeBoundary>, output: Box<dyn AudioOutput>) -> Self {
        Self::with_config(PlayerConfig::default(), source, output)
    }

    pub fn with_config(
        config: PlayerConfig,
        source: Box<dyn DecodeBoundary>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        Self {
            config,
            source,
            output,
            state: PlayState::Stopped,
            session: None,
            clock: PlaybackClock::new(),
            health: Arc::new(PlaybackHealth::new()),
            presentation: Presentation::new(),
            play_time_us: 0,
            av_sync_us: 0,
            playback_complete: false,
            disposed: false,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Start playback, or resume it when paused.
    ///
    /// On error no session is left behind and the player stays stopped.
    pub fn play(&mut self) -> Result<()> {
        if self.disposed {
            return Err(PlayerError::Disposed);
        }
        match self.state {
            PlayState::Playing => Ok(()),
            PlayState::Paused => {
                if self.set_state(PlayState::Playing) {
                    info!("VideoPlayer: resumed at {}µs", self.clock.micros());
                }
                Ok(())
            }
            PlayState::Stopped => {
                let session = self.start_session()?;
                self.session = Some(session);
                self.set_state(PlayState::Playing);
                Ok(())
            }
        }
    }

    /// Pause a playing session; ignored when stopped or already paused.
    pub fn pause(&mut self) {
        if self.state != PlayState::Paused && self.set_state(PlayState::Paused) {
            info!("VideoPlayer: paused at {}µs", self.clock.micros());
        }
    }

    fn set_state(&mut self, target: PlayState) -> bool {
        if !self.state.can_transition_to(&target) {
            debug!("VideoPlayer: ignoring {} -> {}", self.state, target);
            return false;
        }
        self.state = target;
        true
    }

    /// Abort the session, if any, and reset to the initial stopped state.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            Self::teardown(session);
            info!("VideoPlayer: stopped ({})", self.health.summary());
        }
        self.set_state(PlayState::Stopped);
        self.clock.reset();
        self.play_time_us = 0;
        self.av_sync_us = 0;
        self.presentation.reset();
    }

    /// Advance the player by one host frame of `dt` seconds.
    ///
    /// Returns the fatal error that ended the session, if one arrived since the
    /// last tick; the player is already stopped when it does. A paused session
    /// is checked too, but otherwise does not advance.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        let fatal = self.session.as_ref().and_then(|s| s.shared.take_fatal());
        if let Some(e) = fatal {
            error!("VideoPlayer: playback aborted in {} state: {}", self.state, e);
            self.stop();
            return Err(e);
        }

        if !self.state.is_playing() {
            return Ok(());
        }

        let Some(active) = self.session.as_mut() else {
            return Ok(());
        };

        self.play_time_us += (f64::from(dt.max(0.0)) * 1_000_000.0) as i64;

        let writer = active.writer.as_ref();
        let outcome = active.gate.tick(&active.shared, &self.clock, |chunk| {
            if let Some(writer) = writer {
                writer.submit(chunk);
            }
        });

        if let Some(frame) = outcome.released {
            self.av_sync_us = frame.timestamp.diff(self.clock.now()).as_micros() as i64;
            self.health.record_presented();
            self.presentation.present(frame);
        }

        if outcome.complete && !self.playback_complete {
            info!(
                "VideoPlayer: playback complete after {} frames",
                self.presentation.frame_number()
            );
            self.playback_complete = true;
        }

        let audio_pending = active.writer.as_ref().map_or(0, |w| w.pending());
        if self.playback_complete && active.shared.is_finished() && audio_pending == 0 {
            self.finish();
        }
        Ok(())
    }

    /// End a completed session; the last frame and the final clock stay visible
    /// until the next `play()` or `stop()`.
    fn finish(&mut self) {
        if let Some(session) = self.session.take() {
            Self::teardown(session);
            info!("VideoPlayer: finished ({})", self.health.summary());
        }
        self.set_state(PlayState::Stopped);
    }

    /// Release everything; the player cannot be played afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if self.presentation.release() {
            debug!("VideoPlayer: released presentation frame");
        }
        self.stop();
        self.disposed = true;
        info!("VideoPlayer: disposed");
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// All decoded media of the last session has been presented
    pub fn is_playback_complete(&self) -> bool {
        self.playback_complete
    }

    /// The frame on screen
    pub fn current_video_frame(&self) -> Option<&VideoFrame> {
        self.presentation.current()
    }

    /// The frame on screen, only if it changed since the last call
    pub fn take_new_frame(&mut self) -> Option<&VideoFrame> {
        self.presentation.take_new()
    }

    /// Audio clock in microseconds
    pub fn playback_time_micros(&self) -> i64 {
        self.clock.micros()
    }

    /// Host time accumulated through `update` while playing
    pub fn play_time_millis(&self) -> i64 {
        self.play_time_us / 1_000
    }

    pub fn video_timestamp_micros(&self) -> i64 {
        self.presentation
            .current()
            .map_or(0, |frame| frame.timestamp.micros)
    }

    pub fn audio_timestamp_micros(&self) -> i64 {
        self.clock.micros()
    }

    pub fn av_sync_micros(&self) -> i64 {
        self.av_sync_us
    }

    pub fn frame_number(&self) -> u64 {
        self.presentation.frame_number()
    }

    pub fn video_queue_depth(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.shared.video.count())
    }

    pub fn audio_queue_depth(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.shared.audio.count())
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            play_time_us: self.play_time_us,
            audio_ts_us: self.audio_timestamp_micros(),
            video_ts_us: self.video_timestamp_micros(),
            av_sync_us: self.av_sync_us,
            video_queued: self.video_queue_depth(),
            audio_queued: self.audio_queue_depth(),
            health: self.health.summary(),
        }
    }

    fn start_session(&mut self) -> Result<ActiveSession> {
        info!("VideoPlayer: opening {}", self.source.describe());
        let mut context = self
            .source
            .open_stream()
            .map_err(PlayerError::SourceOpen)?;

        let health = Arc::new(PlaybackHealth::new());
        let (streams, writer) = match self.open_pipeline(context.as_mut(), &health) {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(close_err) = context.close() {
                    debug!("VideoPlayer: closing source after failed start: {}", close_err);
                }
                warn!("VideoPlayer: could not start playback: {}", e);
                return Err(e);
            }
        };

        let shared = Arc::new(Session::new(health.clone()));
        let adapter = DecoderAdapter::new(
            context,
            streams,
            shared.clone(),
            PacingController::new(&self.config),
        );
        let decode_thread = match adapter.spawn(&self.config.decode_thread_name) {
            Ok(handle) => handle,
            Err(e) => {
                writer.shutdown();
                return Err(PlayerError::Thread(e));
            }
        };

        self.health = health;
        self.clock.reset();
        self.play_time_us = 0;
        self.av_sync_us = 0;
        self.playback_complete = false;
        self.presentation.reset();

        Ok(ActiveSession {
            shared,
            gate: SyncGate::new(&self.config),
            writer: Some(writer),
            decode_thread: Some(decode_thread),
        })
    }

    /// Resolve streams, open decoders and the sink, start the writer.
    fn open_pipeline(
        &mut self,
        context: &mut dyn DecodeContext,
        health: &Arc<PlaybackHealth>,
    ) -> Result<(StreamMap, AudioSinkWriter)> {
        let streams = StreamMap::discover(&context.streams())?;
        debug!(
            "VideoPlayer: video stream {}, audio stream {}",
            streams.video.index, streams.audio.index
        );

        let format = context
            .open_decoders(&streams.video, &streams.audio)
            .map_err(PlayerError::DecoderOpen)?;
        let sink = self.output.open(&format).map_err(PlayerError::AudioDevice)?;
        info!("VideoPlayer: audio output {}", format);

        let writer = AudioSinkWriter::spawn(
            sink,
            self.clock.clone(),
            health.clone(),
            &self.config.writer_thread_name,
        )
        .map_err(PlayerError::AudioDevice)?;
        Ok((streams, writer))
    }

    fn teardown(mut session: ActiveSession) {
        session.shared.signal.cancel();
        if let Some(handle) = session.decode_thread.take()
            && handle.join().is_err()
        {
            warn!("VideoPlayer: decode thread panicked");
        }
        if let Some(writer) = session.writer.take() {
            writer.shutdown();
        }

        let video = session.shared.video.clear();
        let audio = session.shared.audio.clear();
        if video + audio > 0 {
            debug!(
                "VideoPlayer: discarded {} video frames and {} audio chunks",
                video, audio
            );
        }
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{NullAudioOutput, NullSinkTracker};
    use crate::decoder::synthetic::{ContextTracker, Failure, SyntheticSource, SyntheticSpec};
    use crate::pipeline::MediaKind;
    use std::time::{Duration, Instant};

    fn player_for(spec: SyntheticSpec, output: NullAudioOutput) -> (VideoPlayer, ContextTracker, NullSinkTracker) {
        let source = SyntheticSource::new(spec);
        let context_tracker = source.tracker();
        let sink_tracker = output.tracker();
        let player = VideoPlayer::new(Box::new(source), Box::new(output));
        (player, context_tracker, sink_tracker)
    }

    fn short_clip() -> SyntheticSpec {
        SyntheticSpec::from_timestamps(&[0, 10_000, 20_000], &[0, 20_000])
    }

    /// Tick until `done` or fail after a few seconds; returns the first error
    fn run_until(player: &mut VideoPlayer, done: impl Fn(&VideoPlayer) -> bool) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(player) {
            assert!(Instant::now() < deadline, "player did not settle");
            player.update(0.001)?;
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    #[test]
    fn test_stop_twice_is_safe() {
        let (mut player, contexts, sink) = player_for(short_clip(), NullAudioOutput::instant());
        player.stop();
        player.stop();
        assert_eq!(player.state(), PlayState::Stopped);

        player.play().unwrap();
        player.stop();
        player.stop();
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(contexts.closed(), 1);
        assert_eq!(sink.snapshot().closed, 1);
    }

    #[test]
    fn test_missing_streams_are_fatal_at_start() {
        let (mut player, contexts, sink) =
            player_for(short_clip().without_audio(), NullAudioOutput::instant());
        assert!(matches!(player.play(), Err(PlayerError::NoAudioStream)));
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(contexts.opened(), 1);
        assert_eq!(contexts.closed(), 1);
        assert_eq!(sink.snapshot().opened, 0);

        let (mut player, _, _) = player_for(short_clip().without_video(), NullAudioOutput::instant());
        assert!(matches!(player.play(), Err(PlayerError::NoVideoStream)));
        assert_eq!(player.state(), PlayState::Stopped);
    }

    #[test]
    fn test_open_failures_map_to_player_errors() {
        let (mut player, contexts, _) = player_for(
            short_clip().with_failure(Failure::OpenSource),
            NullAudioOutput::instant(),
        );
        assert!(matches!(player.play(), Err(PlayerError::SourceOpen(_))));
        assert_eq!(contexts.opened(), 0);

        let (mut player, contexts, _) = player_for(
            short_clip().with_failure(Failure::OpenDecoders),
            NullAudioOutput::instant(),
        );
        assert!(matches!(player.play(), Err(PlayerError::DecoderOpen(_))));
        assert_eq!(contexts.closed(), 1);
    }

    #[test]
    fn test_unavailable_audio_device_is_fatal() {
        let (mut player, contexts, _) = player_for(short_clip(), NullAudioOutput::unavailable());
        let err = player.play().unwrap_err();
        assert!(matches!(err, PlayerError::AudioDevice(_)));
        assert!(err.is_startup());
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(contexts.closed(), 1);
    }

    #[test]
    fn test_plays_to_completion_and_stops() {
        let (mut player, contexts, sink) = player_for(short_clip(), NullAudioOutput::instant());
        player.play().unwrap();
        assert_eq!(player.state(), PlayState::Playing);

        run_until(&mut player, |p| p.state() == PlayState::Stopped).unwrap();

        assert!(player.is_playback_complete());
        let stats = player.stats();
        assert_eq!(stats.health.frames_presented, 3);
        assert_eq!(stats.health.chunks_written, 2);
        assert_eq!(contexts.closed(), 1);

        let activity = sink.snapshot();
        assert_eq!(activity.closed, 1);
        assert_eq!(activity.positions, vec![20_000, 40_000]);

        // Last frame and final clock stay up after completion
        assert_eq!(player.video_timestamp_micros(), 20_000);
        assert_eq!(player.playback_time_micros(), 40_000);

        player.stop();
        assert_eq!(player.playback_time_micros(), 0);
        assert!(player.current_video_frame().is_none());
        assert!(player.is_playback_complete());
    }

    #[test]
    fn test_frames_are_presented_in_order() {
        let (mut player, _, _) = player_for(short_clip(), NullAudioOutput::instant());
        player.play().unwrap();

        let mut shown = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while player.state() == PlayState::Playing {
            assert!(Instant::now() < deadline, "player did not finish");
            player.update(0.001).unwrap();
            if let Some(frame) = player.take_new_frame() {
                shown.push(frame.timestamp.micros);
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(shown, vec![0, 10_000, 20_000]);
        assert_eq!(player.frame_number(), 3);
        assert!(player.take_new_frame().is_none());
    }

    #[test]
    fn test_update_is_noop_unless_playing() {
        let (mut player, _, _) = player_for(short_clip(), NullAudioOutput::instant());
        player.update(1.0).unwrap();
        assert_eq!(player.play_time_millis(), 0);

        player.play().unwrap();
        player.pause();
        assert_eq!(player.state(), PlayState::Paused);
        player.update(1.0).unwrap();
        assert_eq!(player.play_time_millis(), 0);
        assert_eq!(player.frame_number(), 0);

        player.play().unwrap();
        assert_eq!(player.state(), PlayState::Playing);
        player.update(0.5).unwrap();
        assert_eq!(player.play_time_millis(), 500);

        run_until(&mut player, |p| p.frame_number() >= 1 || p.state() == PlayState::Stopped)
            .unwrap();
        player.stop();
    }

    #[test]
    fn test_play_while_playing_keeps_session() {
        let (mut player, contexts, _) = player_for(short_clip(), NullAudioOutput::instant());
        player.play().unwrap();
        player.play().unwrap();
        assert_eq!(contexts.opened(), 1);
        player.stop();
    }

    #[test]
    fn test_decode_error_surfaces_through_update() {
        let spec = SyntheticSpec::from_timestamps(&[0, 5_000, 10_000], &[0, 5_000])
            .with_passes(3)
            .with_failure(Failure::Decode {
                kind: MediaKind::Video,
                packet: 1,
            });
        let (mut player, contexts, sink) = player_for(spec, NullAudioOutput::instant());
        player.play().unwrap();

        let err = run_until(&mut player, |_| false).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::Decode {
                kind: MediaKind::Video,
                ..
            }
        ));
        assert!(!err.is_startup());
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(!player.is_playback_complete());
        assert!(player.stats().health.frames_presented <= 1);
        assert_eq!(contexts.closed(), 1);
        assert_eq!(sink.snapshot().closed, 1);

        // Reusable after a fatal error
        player.play().unwrap();
        assert_eq!(player.state(), PlayState::Playing);
        assert_eq!(contexts.opened(), 2);
        player.stop();
    }

    #[test]
    fn test_decode_error_while_paused_stops_the_player() {
        let spec = SyntheticSpec::from_timestamps(&[0, 5_000, 10_000], &[0, 5_000]).with_failure(
            Failure::Decode {
                kind: MediaKind::Audio,
                packet: 0,
            },
        );
        let (mut player, contexts, sink) = player_for(spec, NullAudioOutput::instant());
        player.play().unwrap();
        player.pause();
        assert_eq!(player.state(), PlayState::Paused);

        let err = run_until(&mut player, |_| false).unwrap_err();
        assert!(matches!(
            err,
            PlayerError::Decode {
                kind: MediaKind::Audio,
                ..
            }
        ));
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(player.frame_number(), 0);
        assert_eq!(player.play_time_millis(), 0);
        assert_eq!(contexts.closed(), 1);
        assert_eq!(sink.snapshot().closed, 1);
    }

    #[test]
    fn test_pause_from_stopped_is_ignored() {
        let (mut player, contexts, _) = player_for(short_clip(), NullAudioOutput::instant());
        player.pause();
        assert_eq!(player.state(), PlayState::Stopped);
        assert_eq!(contexts.opened(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent_and_final() {
        let (mut player, contexts, sink) = player_for(short_clip(), NullAudioOutput::instant());
        player.play().unwrap();
        player.dispose();
        player.dispose();

        assert!(player.is_disposed());
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(matches!(player.play(), Err(PlayerError::Disposed)));
        assert_eq!(contexts.closed(), 1);
        assert_eq!(sink.snapshot().closed, 1);
    }
}
