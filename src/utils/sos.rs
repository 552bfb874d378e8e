use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a wait on a [`SignalOfStop`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The consumer side finished draining the queued output
    Drained,
    /// Abrupt stop requested
    Cancelled,
}

/// Single-slot signal between the decode thread (the one waiter) and the
/// player (the one signaler).
///
/// Carries two latched flags: `drained`, raised when the consumer has emptied
/// both queues after end of stream, and `cancelled`, raised on stop. Both
/// wake any waiter; cancellation also cuts pacing sleeps short.
#[derive(Debug, Clone)]
pub struct SignalOfStop {
    shared: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    flags: Mutex<Flags>,
    condvar: Condvar,
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    drained: bool,
    cancelled: bool,
}

impl SignalOfStop {
    pub fn new() -> SignalOfStop {
        SignalOfStop {
            shared: Arc::new(SharedState::default()),
        }
    }

    /// Request an abrupt stop
    pub fn cancel(&self) {
        let mut flags = self.shared.flags.lock();
        flags.cancelled = true;
        self.shared.condvar.notify_all();
    }

    /// Report that all queued output has been consumed
    pub fn notify_drained(&self) {
        let mut flags = self.shared.flags.lock();
        flags.drained = true;
        self.shared.condvar.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.flags.lock().cancelled
    }

    /// Block until drained or cancelled. Cancellation wins if both are set.
    pub fn wait(&self) -> Wake {
        let mut flags = self.shared.flags.lock();
        loop {
            if flags.cancelled {
                return Wake::Cancelled;
            }
            if flags.drained {
                return Wake::Drained;
            }
            self.shared.condvar.wait(&mut flags);
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation. A drain
    /// notification does not interrupt it.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut flags = self.shared.flags.lock();
        while !flags.cancelled {
            if self
                .shared
                .condvar
                .wait_until(&mut flags, deadline)
                .timed_out()
            {
                return !flags.cancelled;
            }
        }
        false
    }
}

impl Default for SignalOfStop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_wakes_waiter() {
        let signal = SignalOfStop::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait());

        thread::sleep(Duration::from_millis(10));
        signal.notify_drained();
        assert_eq!(handle.join().unwrap(), Wake::Drained);
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let signal = SignalOfStop::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait());

        thread::sleep(Duration::from_millis(10));
        signal.cancel();
        assert_eq!(handle.join().unwrap(), Wake::Cancelled);
    }

    #[test]
    fn test_latched_signal_returns_immediately() {
        let signal = SignalOfStop::new();
        signal.notify_drained();
        assert_eq!(signal.wait(), Wake::Drained);
        signal.cancel();
        assert_eq!(signal.wait(), Wake::Cancelled);
    }

    #[test]
    fn test_sleep_runs_full_duration() {
        let signal = SignalOfStop::new();
        let start = Instant::now();
        assert!(signal.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let signal = SignalOfStop::new();
        let sleeper = signal.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(10)));

        thread::sleep(Duration::from_millis(10));
        signal.cancel();
        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
