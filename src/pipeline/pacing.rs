//! Decode backpressure
//!
//! Video is paced off audio, never the reverse: the throttle only inspects the
//! spacing of buffered video frames, so audio decode is never stalled by it.
//! Once enough audio is buffered, the decode thread sleeps while the two
//! oldest video frames are further apart than the prebuffer threshold, half
//! the gap at a time, re-checking after every sleep.

use std::time::Duration;

use super::frame_queue::FrameQueue;
use super::types::{AudioChunk, VideoFrame};
use crate::config::PlayerConfig;
use crate::utils::sos::SignalOfStop;

/// Something the decode thread can be put to sleep on.
pub trait PacingSleeper {
    /// Sleep for `duration`. Returns `false` if interrupted by a stop request.
    fn sleep(&self, duration: Duration) -> bool;
}

impl PacingSleeper for SignalOfStop {
    fn sleep(&self, duration: Duration) -> bool {
        SignalOfStop::sleep(self, duration)
    }
}

/// Outcome of a pacing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Decoding may continue; carries the number of sleeps taken
    Proceed { sleeps: u32 },
    /// A stop request arrived while sleeping
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
pub struct PacingController {
    prebuffer_threshold_us: i64,
    min_audio_chunks: usize,
}

impl PacingController {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            prebuffer_threshold_us: config.prebuffer_threshold_us,
            min_audio_chunks: config.pacing_min_audio_chunks,
        }
    }

    /// How long to sleep given the current video queue, if at all.
    ///
    /// Sleeps only while at least two frames are buffered and their timestamp
    /// gap is positive and strictly exceeds the prebuffer threshold; the sleep
    /// is half the gap.
    pub fn video_delay(&self, video: &FrameQueue<VideoFrame>) -> Option<Duration> {
        let gap = video.front_gap_micros().ok()?;
        if gap > 0 && gap > self.prebuffer_threshold_us {
            Some(Duration::from_micros((gap / 2) as u64))
        } else {
            None
        }
    }

    /// Whether enough audio is buffered for pacing to apply at all
    pub fn engaged(&self, audio: &FrameQueue<AudioChunk>) -> bool {
        audio.count() >= self.min_audio_chunks
    }

    /// Run the throttle before the next packet is decoded.
    ///
    /// The audio depth gate is evaluated once; the loop itself looks only at
    /// video, which the consumer drains while we sleep.
    pub fn pace<S: PacingSleeper + ?Sized>(
        &self,
        video: &FrameQueue<VideoFrame>,
        audio: &FrameQueue<AudioChunk>,
        sleeper: &S,
        mut on_sleep: impl FnMut(Duration),
    ) -> Pace {
        let mut sleeps = 0;
        if !self.engaged(audio) {
            return Pace::Proceed { sleeps };
        }
        while let Some(delay) = self.video_delay(video) {
            if !sleeper.sleep(delay) {
                return Pace::Interrupted;
            }
            sleeps += 1;
            on_sleep(delay);
        }
        Pace::Proceed { sleeps }
    }
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new(&PlayerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Timestamp;
    use std::cell::RefCell;

    fn video(ts: &[i64]) -> FrameQueue<VideoFrame> {
        let queue = FrameQueue::new();
        for &t in ts {
            queue.enqueue(VideoFrame::new(vec![0u8; 3], 1, 1, Timestamp::from_micros(t)));
        }
        queue
    }

    fn audio(n: usize) -> FrameQueue<AudioChunk> {
        let queue = FrameQueue::new();
        for i in 0..n {
            queue.enqueue(AudioChunk::new(vec![0u8; 4], Timestamp::from_micros(i as i64 * 20_000)));
        }
        queue
    }

    /// Virtual clock: records every requested sleep and lets the consumer side
    /// make progress by dequeuing one video frame per sleep.
    struct VirtualSleeper<'a> {
        slept: RefCell<Vec<Duration>>,
        drain_from: Option<&'a FrameQueue<VideoFrame>>,
        interrupt_after: Option<usize>,
    }

    impl<'a> VirtualSleeper<'a> {
        fn new(drain_from: Option<&'a FrameQueue<VideoFrame>>) -> Self {
            Self {
                slept: RefCell::new(Vec::new()),
                drain_from,
                interrupt_after: None,
            }
        }
    }

    impl PacingSleeper for VirtualSleeper<'_> {
        fn sleep(&self, duration: Duration) -> bool {
            let mut slept = self.slept.borrow_mut();
            if self.interrupt_after == Some(slept.len()) {
                return false;
            }
            slept.push(duration);
            if let Some(queue) = self.drain_from {
                let _ = queue.dequeue();
            }
            true
        }
    }

    #[test]
    fn test_small_gap_does_not_sleep() {
        let pacer = PacingController::default();
        let v = video(&[0, 5_000]);
        assert_eq!(pacer.video_delay(&v), None);

        let sleeper = VirtualSleeper::new(None);
        assert_eq!(pacer.pace(&v, &audio(2), &sleeper, |_| {}), Pace::Proceed { sleeps: 0 });
        assert!(sleeper.slept.borrow().is_empty());
    }

    #[test]
    fn test_large_gap_sleeps_half_the_gap() {
        let pacer = PacingController::default();
        let v = video(&[0, 20_000]);
        assert_eq!(pacer.video_delay(&v), Some(Duration::from_micros(10_000)));

        let sleeper = VirtualSleeper::new(Some(&v));
        let mut reported = Vec::new();
        let pace = pacer.pace(&v, &audio(2), &sleeper, |d| reported.push(d));

        assert_eq!(pace, Pace::Proceed { sleeps: 1 });
        assert_eq!(*sleeper.slept.borrow(), vec![Duration::from_micros(10_000)]);
        assert_eq!(reported, vec![Duration::from_micros(10_000)]);
    }

    #[test]
    fn test_gap_equal_to_threshold_does_not_sleep() {
        let pacer = PacingController::default();
        assert_eq!(pacer.video_delay(&video(&[0, 10_000])), None);
    }

    #[test]
    fn test_negative_threshold_never_sleeps_on_equal_or_reversed_timestamps() {
        let config = PlayerConfig {
            prebuffer_threshold_us: -5_000,
            ..PlayerConfig::default()
        };
        let pacer = PacingController::new(&config);
        assert_eq!(pacer.video_delay(&video(&[40_000, 40_000])), None);
        assert_eq!(pacer.video_delay(&video(&[40_000, 30_000])), None);
        assert_eq!(pacer.video_delay(&video(&[0, 2_000])), Some(Duration::from_micros(1_000)));
    }

    #[test]
    fn test_single_frame_never_sleeps() {
        let pacer = PacingController::default();
        assert_eq!(pacer.video_delay(&video(&[0])), None);
        assert_eq!(pacer.video_delay(&video(&[])), None);
    }

    #[test]
    fn test_not_engaged_without_audio_backlog() {
        let pacer = PacingController::default();
        let v = video(&[0, 50_000]);
        let sleeper = VirtualSleeper::new(None);
        assert_eq!(pacer.pace(&v, &audio(1), &sleeper, |_| {}), Pace::Proceed { sleeps: 0 });
        assert!(sleeper.slept.borrow().is_empty());
    }

    #[test]
    fn test_reevaluates_after_each_sleep() {
        let pacer = PacingController::default();
        // Gaps: 20ms, 30ms, then 2ms which is under the threshold
        let v = video(&[0, 20_000, 50_000, 52_000]);
        let sleeper = VirtualSleeper::new(Some(&v));

        let pace = pacer.pace(&v, &audio(3), &sleeper, |_| {});

        assert_eq!(pace, Pace::Proceed { sleeps: 2 });
        assert_eq!(
            *sleeper.slept.borrow(),
            vec![Duration::from_micros(10_000), Duration::from_micros(15_000)]
        );
        // Never proceeds while the remaining gap is over the threshold
        assert!(v.front_gap_micros().unwrap() <= 10_000);
    }

    #[test]
    fn test_interrupted_sleep_aborts() {
        let pacer = PacingController::default();
        let v = video(&[0, 40_000]);
        let mut sleeper = VirtualSleeper::new(None);
        sleeper.interrupt_after = Some(0);
        assert_eq!(pacer.pace(&v, &audio(2), &sleeper, |_| {}), Pace::Interrupted);
    }

    #[test]
    fn test_real_sleeper_is_cancellable() {
        let pacer = PacingController::default();
        let v = video(&[0, 10_000_000]);
        let signal = SignalOfStop::new();
        signal.cancel();
        assert_eq!(pacer.pace(&v, &audio(2), &signal, |_| {}), Pace::Interrupted);
    }
}
