use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::take_failure;
use crate::error::{DeviceError, DeviceResult};
use crate::traits::ModemDevice;
use crate::types::ModemStatus;

const DEVICE: &str = "modem";
const EIO: i32 = -5;
const ENODATA: i64 = -61;
const DEFAULT_WAIT: Duration = Duration::from_millis(50);

/// Simulated receiver modem with a queue of pending bursts
pub struct SimModem {
    inner: Mutex<ModemInner>,
    signal: Condvar,
    wait: Duration,
}

#[derive(Default)]
struct ModemInner {
    ready: bool,
    running: bool,
    fault: bool,
    fail_inits: u32,
    fail_starts: u32,
    short_reads: u32,
    init_calls: u32,
    start_calls: u32,
    bursts: VecDeque<Vec<u8>>,
    pending: Option<Vec<u8>>,
    bursts_received: u64,
    bytes_read: u64,
}

impl SimModem {
    pub fn new() -> Self {
        Self::with_wait(DEFAULT_WAIT)
    }

    /// `receive()` gives up and reports no data after `wait`
    pub fn with_wait(wait: Duration) -> Self {
        Self {
            inner: Mutex::new(ModemInner::default()),
            signal: Condvar::new(),
            wait,
        }
    }

    /// Queue a downlink burst and wake a blocked `receive()`
    pub fn push_burst(&self, burst: Vec<u8>) {
        self.inner.lock().bursts.push_back(burst);
        self.signal.notify_all();
    }

    pub fn queued_bursts(&self) -> usize {
        self.inner.lock().bursts.len()
    }

    pub fn fail_next_inits(&self, count: u32) {
        self.inner.lock().fail_inits = count;
    }

    pub fn fail_next_starts(&self, count: u32) {
        self.inner.lock().fail_starts = count;
    }

    pub fn short_next_reads(&self, count: u32) {
        self.inner.lock().short_reads = count;
    }

    /// Next `receive()` reports an unrecoverable driver fault
    pub fn inject_fault(&self) {
        self.inner.lock().fault = true;
        self.signal.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn init_calls(&self) -> u32 {
        self.inner.lock().init_calls
    }

    pub fn start_calls(&self) -> u32 {
        self.inner.lock().start_calls
    }
}

impl Default for SimModem {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemDevice for SimModem {
    fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    fn init(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        inner.init_calls += 1;
        if inner.ready {
            return Err(DeviceError::AlreadyReady(DEVICE));
        }
        if take_failure(&mut inner.fail_inits) {
            return Err(DeviceError::InitFailed { device: DEVICE, code: EIO });
        }
        inner.ready = true;
        Ok(())
    }

    fn start(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        inner.start_calls += 1;
        if !inner.ready {
            return Err(DeviceError::NotReady(DEVICE));
        }
        if take_failure(&mut inner.fail_starts) {
            return Err(DeviceError::StartFailed { device: DEVICE, code: EIO });
        }
        inner.running = true;
        debug!("sim modem receive path enabled");
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        if !inner.running {
            return Err(DeviceError::NotReady(DEVICE));
        }
        inner.running = false;
        inner.pending = None;
        drop(inner);
        self.signal.notify_all();
        debug!("sim modem receive path disabled");
        Ok(())
    }

    fn receive(&self) -> DeviceResult<usize> {
        let mut inner = self.inner.lock();
        loop {
            if inner.fault {
                inner.fault = false;
                return Err(DeviceError::Unrecoverable {
                    device: DEVICE,
                    reason: "DMA engine halted".into(),
                });
            }
            if !inner.running {
                return Err(DeviceError::Stopped);
            }
            if let Some(burst) = inner.bursts.pop_front() {
                let len = burst.len();
                inner.pending = Some(burst);
                inner.bursts_received += 1;
                return Ok(len);
            }
            if self.signal.wait_for(&mut inner, self.wait).timed_out()
                && inner.bursts.is_empty()
                && inner.running
                && !inner.fault
            {
                return Ok(0);
            }
        }
    }

    fn read(&self, buf: &mut [u8]) -> DeviceResult<usize> {
        let mut inner = self.inner.lock();
        let burst = inner
            .pending
            .take()
            .ok_or(DeviceError::Read { code: ENODATA })?;

        let mut len = burst.len().min(buf.len());
        if take_failure(&mut inner.short_reads) {
            len /= 2;
        }
        buf[..len].copy_from_slice(&burst[..len]);
        inner.bytes_read += len as u64;
        Ok(len)
    }

    fn read_status(&self) -> DeviceResult<ModemStatus> {
        let inner = self.inner.lock();
        Ok(ModemStatus {
            running: inner.running,
            bursts_received: inner.bursts_received,
            bytes_read: inner.bytes_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn running_modem() -> SimModem {
        let modem = SimModem::with_wait(Duration::from_millis(10));
        modem.init().unwrap();
        modem.start().unwrap();
        modem
    }

    #[test]
    fn test_receive_then_read() {
        let modem = running_modem();
        modem.push_burst(vec![7u8; 32]);

        assert_eq!(modem.receive(), Ok(32));
        let mut buf = vec![0u8; 32];
        assert_eq!(modem.read(&mut buf), Ok(32));
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_receive_times_out_with_zero() {
        let modem = running_modem();
        assert_eq!(modem.receive(), Ok(0));
    }

    #[test]
    fn test_read_without_pending_burst() {
        let modem = running_modem();
        let mut buf = [0u8; 4];
        assert_eq!(modem.read(&mut buf), Err(DeviceError::Read { code: ENODATA }));
    }

    #[test]
    fn test_short_read_injection() {
        let modem = running_modem();
        modem.short_next_reads(1);
        modem.push_burst(vec![1u8; 100]);

        let n = modem.receive().unwrap();
        let mut buf = vec![0u8; n];
        assert_eq!(modem.read(&mut buf), Ok(50));
    }

    #[test]
    fn test_stop_wakes_blocked_receive() {
        let modem = Arc::new(SimModem::with_wait(Duration::from_secs(30)));
        modem.init().unwrap();
        modem.start().unwrap();

        let rx = Arc::clone(&modem);
        let handle = thread::spawn(move || rx.receive());
        thread::sleep(Duration::from_millis(20));
        modem.stop().unwrap();

        assert_eq!(handle.join().unwrap(), Err(DeviceError::Stopped));
    }

    #[test]
    fn test_start_requires_init() {
        let modem = SimModem::new();
        assert_eq!(modem.start(), Err(DeviceError::NotReady("modem")));
        assert_eq!(modem.start_calls(), 1);
    }

    #[test]
    fn test_fault_is_fatal() {
        let modem = running_modem();
        modem.inject_fault();
        let err = modem.receive().unwrap_err();
        assert!(err.is_fatal());
    }
}
