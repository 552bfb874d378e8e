use thiserror::Error;

use crate::pipeline::MediaKind;

/// Session-ending failures.
///
/// Every variant aborts the current playback session; the player is left
/// `Stopped` and can be played again, which reinitializes from scratch.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("could not open media source")]
    SourceOpen(#[source] anyhow::Error),
    #[error("no video stream in source")]
    NoVideoStream,
    #[error("no audio stream in source")]
    NoAudioStream,
    #[error("could not open decoders")]
    DecoderOpen(#[source] anyhow::Error),
    #[error("no audio output available")]
    AudioDevice(#[source] anyhow::Error),
    #[error("failed to read packet")]
    Read(#[source] anyhow::Error),
    #[error("error decoding {kind} packet")]
    Decode {
        kind: MediaKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to flush decoders at end of stream")]
    Flush(#[source] anyhow::Error),
    #[error("failed to start worker thread")]
    Thread(#[from] std::io::Error),
    #[error("player has been disposed")]
    Disposed,
}

impl PlayerError {
    /// Raised while setting up a session, before any thread was started
    pub fn is_startup(&self) -> bool {
        !matches!(
            self,
            PlayerError::Read(_) | PlayerError::Decode { .. } | PlayerError::Flush(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
