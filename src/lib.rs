//! Audio-master A/V playback pipeline
//!
//! A [`VideoPlayer`] decodes on a background thread into two timestamp-ordered
//! queues, paces decoding off the buffered video, and on every host tick
//! releases the next video frame once the audio clock has caught up with it.
//! Decoding and audio output are reached through the [`decoder`] and [`audio`]
//! boundary traits.

pub mod audio;
pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod player;
pub mod utils;

pub use config::PlayerConfig;
pub use error::PlayerError;
pub use player::VideoPlayer;
