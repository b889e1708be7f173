//! Shared hardware state
//!
//! One [`HardwareStateStore`] is shared (behind an `Arc`) by every loop in
//! the process. All fields sit under a single lock; no operation blocks on
//! anything but that lock.
//!
//! ```text
//!            init ok             start ok
//! NotReady ───────────▶ Initialized ───────────▶ Armed
//!    ▲                       ▲                     │
//!    │                       └──── disarm ─────────┤
//!    └──────────── forced detach ──────────────────┘
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::StateError;
use crate::pacing::CancelToken;

/// Receiver modem lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    NotReady,
    Initialized,
    Armed,
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotReady => "not-ready",
            Self::Initialized => "initialized",
            Self::Armed => "armed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Thread Status
// ============================================================================

/// Process-wide liveness flag
///
/// Positive while running. Any loop may drive it to `0` (shutdown) or a
/// negative value (fatal); once non-positive it never rises again, and
/// every waiter on [`ThreadStatus::token`] is woken.
pub struct ThreadStatus {
    value: AtomicI32,
    stopped: CancelToken,
}

impl ThreadStatus {
    pub const RUNNING: i32 = 1;
    pub const SHUTDOWN: i32 = 0;
    pub const FATAL: i32 = -1;

    pub fn new() -> Self {
        Self {
            value: AtomicI32::new(Self::RUNNING),
            stopped: CancelToken::new(),
        }
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.value() > 0
    }

    /// Store `value` unless that would raise a non-positive status
    pub fn set(&self, value: i32) {
        let _ = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = if current > 0 { value } else { current.min(value) };
                (next != current).then_some(next)
            });
        if self.value() <= 0 {
            self.stopped.cancel();
        }
    }

    pub fn shutdown(&self) {
        self.set(Self::SHUTDOWN);
    }

    pub fn fatal(&self) {
        self.set(Self::FATAL);
    }

    /// Cancelled once the status goes non-positive
    pub fn token(&self) -> &CancelToken {
        &self.stopped
    }

    /// Block until the status goes non-positive
    pub fn wait(&self) {
        self.stopped.wait();
    }

    pub fn exit_code(&self) -> i32 {
        if self.value() < 0 {
            1
        } else {
            0
        }
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Hardware State Store
// ============================================================================

/// Consistent copy of the hardware record for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareSnapshot {
    pub modem_state: ModemState,
    pub radio_ready: bool,
    pub synthesizer_ready: bool,
    pub last_receive_result: i64,
    pub last_read_result: i64,
}

impl HardwareSnapshot {
    pub fn modem_ready(&self) -> bool {
        self.modem_state != ModemState::NotReady
    }

    pub fn is_armed(&self) -> bool {
        self.modem_state == ModemState::Armed
    }
}

struct HardwareRecord {
    modem_state: ModemState,
    radio_ready: bool,
    synthesizer_ready: bool,
    last_receive_result: i64,
    last_read_result: i64,
    last_receive_failed: bool,
}

pub struct HardwareStateStore {
    record: Mutex<HardwareRecord>,
    status: ThreadStatus,
}

impl HardwareStateStore {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(HardwareRecord {
                modem_state: ModemState::NotReady,
                radio_ready: false,
                synthesizer_ready: false,
                last_receive_result: 0,
                last_read_result: 0,
                last_receive_failed: false,
            }),
            status: ThreadStatus::new(),
        }
    }

    pub fn snapshot(&self) -> HardwareSnapshot {
        let r = self.record.lock();
        HardwareSnapshot {
            modem_state: r.modem_state,
            radio_ready: r.radio_ready,
            synthesizer_ready: r.synthesizer_ready,
            last_receive_result: r.last_receive_result,
            last_read_result: r.last_read_result,
        }
    }

    pub fn modem_state(&self) -> ModemState {
        self.record.lock().modem_state
    }

    /// Atomic transition; a no-op returning `Conflict` when the state moved
    pub fn compare_and_set_state(
        &self,
        expected: ModemState,
        new: ModemState,
    ) -> Result<(), StateError> {
        let mut r = self.record.lock();
        if r.modem_state != expected {
            return Err(StateError::Conflict {
                expected,
                actual: r.modem_state,
            });
        }
        r.modem_state = new;
        Ok(())
    }

    /// Unconditional transition, for when the device state is unknown
    pub fn force_modem_state(&self, state: ModemState) {
        self.record.lock().modem_state = state;
    }

    pub fn set_radio_ready(&self, ready: bool) {
        self.record.lock().radio_ready = ready;
    }

    pub fn set_synthesizer_ready(&self, ready: bool) {
        self.record.lock().synthesizer_ready = ready;
    }

    /// Successes always land; a failure lands only if the previous attempt succeeded
    pub fn record_receive_result(&self, result: i64) {
        let mut r = self.record.lock();
        if result > 0 {
            r.last_receive_result = result;
            r.last_receive_failed = false;
        } else if !r.last_receive_failed {
            r.last_receive_result = result;
            r.last_receive_failed = true;
        }
    }

    pub fn record_read_result(&self, result: i64) {
        self.record.lock().last_read_result = result;
    }

    pub fn thread_status(&self) -> &ThreadStatus {
        &self.status
    }
}

impl Default for HardwareStateStore {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Fuzz: the stored result is the latest success or the first failure after it
        #[test]
        fn fuzz_receive_result_recording(results in proptest::collection::vec(-200i64..4096, 1..64)) {
            let store = HardwareStateStore::new();
            for &r in &results {
                store.record_receive_result(r);
            }

            let tail_start = results.iter().rposition(|&r| r > 0).map_or(0, |i| i + 1);
            let expected = match results.get(tail_start) {
                Some(&first_failure) => first_failure,
                None => results[tail_start - 1],
            };
            prop_assert_eq!(store.snapshot().last_receive_result, expected);
        }

        // Fuzz: no sequence of status writes brings a stopped node back up
        #[test]
        fn fuzz_thread_status_monotonic(values in proptest::collection::vec(-1i32..=1, 1..32)) {
            let status = ThreadStatus::new();
            let mut stopped = false;
            for v in values {
                status.set(v);
                stopped |= v <= 0;
                prop_assert_eq!(status.is_running(), !stopped);
            }
        }
    }
}
