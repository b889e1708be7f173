//! Cancellation and sleeping for the polling loops
//!
//! Every back-off and cadence wait goes through a [`Sleeper`] so tests can
//! run the loops without wall-clock delays, and every wait is cut short by
//! a [`CancelToken`].

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One-shot cancellation flag that wakes anyone waiting on it
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Wait up to `timeout`; true if the token was cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.signal.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }

    /// Block until cancelled
    pub fn wait(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            self.inner.signal.wait(&mut cancelled);
        }
    }
}

/// Interruptible sleep
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration` unless `cancel` fires first; true if cancelled
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Real wall-clock sleeping
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait_timeout(duration)
    }
}

/// Compresses every sleep to about a millisecond and records what was asked
#[derive(Default)]
pub struct InstantSleeper {
    requested: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    const NAP: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().clone()
    }

    pub fn count(&self, duration: Duration) -> usize {
        self.requested.lock().iter().filter(|&&d| d == duration).count()
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        self.requested.lock().push(duration);
        cancel.wait_timeout(Self::NAP.min(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_times_out() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_thread_sleeper_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(ThreadSleeper.sleep(Duration::from_secs(10), &token));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_instant_sleeper_records() {
        let sleeper = InstantSleeper::new();
        let token = CancelToken::new();
        assert!(!sleeper.sleep(Duration::from_secs(5), &token));
        assert!(!sleeper.sleep(Duration::from_secs(5), &token));
        assert_eq!(sleeper.count(Duration::from_secs(5)), 2);
    }
}
