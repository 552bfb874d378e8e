//! Playback pipeline building blocks
//!
//! Separates the concerns of a playback session:
//! - Data transport: timestamp-ordered queues between decode and tick threads
//! - Flow control: pacing the decode thread off the buffered video spacing
//! - Synchronization: the audio clock and the gate that releases video against it
//! - Control: play state and per-session shared state
//!
//! # Architecture
//!
//! ```text
//! decode thread ──► FrameQueue<VideoFrame> ──► SyncGate ──► presentation
//!               └─► FrameQueue<AudioChunk> ──► SyncGate ──► AudioSinkWriter ──► PlaybackClock
//! ```

pub mod clock;
pub mod frame_queue;
pub mod health;
pub mod pacing;
pub mod session;
pub mod state;
pub mod sync_gate;
pub mod types;

pub use clock::PlaybackClock;
pub use frame_queue::{FrameQueue, QueueError};
pub use health::{HealthSummary, PlaybackHealth, PlaybackStats};
pub use pacing::{Pace, PacingController, PacingSleeper};
pub use session::Session;
pub use state::PlayState;
pub use sync_gate::{SyncGate, TickOutcome};
pub use types::{AudioChunk, AudioFormat, MediaKind, Timed, Timestamp, VideoFrame};
