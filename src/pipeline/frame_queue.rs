//! Timestamp-ordered FIFO shared between the decode thread and the tick thread
//!
//! The queue's own operations are the only synchronization primitive callers
//! see. Every operation takes the internal lock for its whole duration, so a
//! peek followed by a conditional dequeue can be done atomically through
//! [`FrameQueue::dequeue_if`]. Nothing ever waits for data: absence is reported
//! as [`QueueError`].

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::types::{Timed, Timestamp};

/// Flow-control outcome of a queue read. Not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
    #[error("queue holds fewer than two items")]
    InsufficientDepth,
}

/// Thread-safe FIFO of decoded units.
///
/// Insertion order is timestamp order, guaranteed by the upstream decode order;
/// the queue never reorders. Growth is unbounded here, the decode pacing keeps
/// it in check.
pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append at the tail. Never blocks on consumers.
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
    }

    /// Remove and return the head item.
    pub fn dequeue(&self) -> Result<T, QueueError> {
        self.items.lock().pop_front().ok_or(QueueError::Empty)
    }

    /// Remove the head item only if `ready` accepts it.
    ///
    /// Returns `Ok(None)` when the head exists but is not ready.
    pub fn dequeue_if<F>(&self, ready: F) -> Result<Option<T>, QueueError>
    where
        F: FnOnce(&T) -> bool,
    {
        let mut items = self.items.lock();
        let head = items.front().ok_or(QueueError::Empty)?;
        if ready(head) {
            Ok(items.pop_front())
        } else {
            Ok(None)
        }
    }

    /// Observe the head item without removing it.
    pub fn peek_head<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&T) -> R,
    {
        self.items.lock().front().map(f).ok_or(QueueError::Empty)
    }

    /// Observe the second item without removing anything.
    pub fn peek_second<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&T) -> R,
    {
        let items = self.items.lock();
        match items.len() {
            0 => Err(QueueError::Empty),
            1 => Err(QueueError::InsufficientDepth),
            _ => Ok(f(&items[1])),
        }
    }

    /// Observe the two oldest items under a single lock acquisition.
    pub fn peek_front_pair<R, F>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&T, &T) -> R,
    {
        let items = self.items.lock();
        match items.len() {
            0 => Err(QueueError::Empty),
            1 => Err(QueueError::InsufficientDepth),
            _ => Ok(f(&items[0], &items[1])),
        }
    }

    pub fn count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop every buffered item, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let discarded = items.len();
        items.clear();
        discarded
    }
}

impl<T: Timed> FrameQueue<T> {
    /// Timestamp of the head item
    pub fn head_timestamp(&self) -> Result<Timestamp, QueueError> {
        self.peek_head(Timed::timestamp)
    }

    /// Timestamp distance between the second-oldest and the oldest item, in µs
    pub fn front_gap_micros(&self) -> Result<i64, QueueError> {
        self.peek_front_pair(|head, second| second.timestamp().micros - head.timestamp().micros)
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FrameQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("count", &self.count())
            .finish()
    }
}
