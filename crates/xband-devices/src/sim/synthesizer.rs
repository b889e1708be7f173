use parking_lot::Mutex;
use tracing::debug;

use super::take_failure;
use crate::error::{DeviceError, DeviceResult};
use crate::traits::SynthesizerDevice;
use crate::types::SynthesizerStatus;

const DEVICE: &str = "synthesizer";
const EIO: i32 = -5;

/// Simulated PLL synthesizer
#[derive(Default)]
pub struct SimSynthesizer {
    inner: Mutex<SynthInner>,
}

#[derive(Default)]
struct SynthInner {
    powered: bool,
    rx_enabled: bool,
    fail_inits: u32,
    fail_stops: u32,
}

impl SimSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_inits(&self, count: u32) {
        self.inner.lock().fail_inits = count;
    }

    pub fn fail_next_stops(&self, count: u32) {
        self.inner.lock().fail_stops = count;
    }
}

impl SynthesizerDevice for SimSynthesizer {
    fn is_ready(&self) -> bool {
        self.inner.lock().powered
    }

    fn init(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        if inner.powered {
            return Err(DeviceError::AlreadyReady(DEVICE));
        }
        if take_failure(&mut inner.fail_inits) {
            return Err(DeviceError::InitFailed { device: DEVICE, code: EIO });
        }
        inner.powered = true;
        debug!("sim synthesizer locked");
        Ok(())
    }

    fn start(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        if !inner.powered {
            return Err(DeviceError::NotReady(DEVICE));
        }
        inner.rx_enabled = true;
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        if take_failure(&mut inner.fail_stops) {
            return Err(DeviceError::StopFailed { device: DEVICE, code: EIO });
        }
        inner.powered = false;
        inner.rx_enabled = false;
        debug!("sim synthesizer powered down");
        Ok(())
    }

    fn read_status(&self) -> DeviceResult<SynthesizerStatus> {
        let inner = self.inner.lock();
        Ok(SynthesizerStatus {
            powered: inner.powered,
            rx_enabled: inner.rx_enabled,
        })
    }
}
