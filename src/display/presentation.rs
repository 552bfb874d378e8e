//! The frame currently on screen
//!
//! Holds the last frame released by the sync gate plus a "new frame" flag the
//! renderer clears when it picks the frame up, so a texture is only re-uploaded
//! when the picture actually changed. When the gate releases nothing the
//! previous frame stays displayed.

use crate::pipeline::VideoFrame;

#[derive(Debug, Default)]
pub struct Presentation {
    current: Option<VideoFrame>,
    fresh: bool,
    presented: u64,
}

impl Presentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayed frame
    pub fn present(&mut self, frame: VideoFrame) {
        self.current = Some(frame);
        self.fresh = true;
        self.presented += 1;
    }

    /// The displayed frame, if any has been shown this session
    pub fn current(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// The displayed frame if it changed since the last call.
    pub fn take_new(&mut self) -> Option<&VideoFrame> {
        if !self.fresh {
            return None;
        }
        self.fresh = false;
        self.current.as_ref()
    }

    pub fn has_new_frame(&self) -> bool {
        self.fresh
    }

    /// Frames presented since the last reset
    pub fn frame_number(&self) -> u64 {
        self.presented
    }

    /// Blank the surface for a new session
    pub fn reset(&mut self) {
        self.current = None;
        self.fresh = false;
        self.presented = 0;
    }

    /// Drop the displayed frame; returns whether there was one
    pub fn release(&mut self) -> bool {
        let had_frame = self.current.is_some();
        self.reset();
        had_frame
    }
}
