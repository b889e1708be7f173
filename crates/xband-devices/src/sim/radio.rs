use parking_lot::Mutex;
use tracing::debug;

use super::take_failure;
use crate::error::{DeviceError, DeviceResult};
use crate::traits::RadioDevice;
use crate::types::{RadioSetting, RadioStatus};

const DEVICE: &str = "radio";
const EINVAL: i32 = -22;
const ETIMEDOUT: i32 = -110;

/// Simulated RF transceiver
pub struct SimRadio {
    inner: Mutex<RadioInner>,
}

struct RadioInner {
    ready: bool,
    fail_inits: u32,
    init_calls: u32,
    rejected: Vec<&'static str>,
    status_fault: bool,
    applied: Vec<RadioSetting>,
    status: RadioStatus,
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RadioInner {
                ready: false,
                fail_inits: 0,
                init_calls: 0,
                rejected: Vec::new(),
                status_fault: false,
                applied: Vec::new(),
                status: RadioStatus {
                    bandwidth_hz: 5_000_000,
                    gain_db: 30.0,
                    gain_mode: "slow_attack".into(),
                    lo_hz: 8_400_000_000,
                    rssi_db: -92.5,
                    sample_rate_hz: 10_000_000,
                    temperature_mc: 38_500,
                    ensm_mode: "sleep".into(),
                },
            }),
        }
    }

    pub fn fail_next_inits(&self, count: u32) {
        self.inner.lock().fail_inits = count;
    }

    /// Make every `configure()` of the named setting fail
    pub fn reject(&self, setting: &'static str) {
        self.inner.lock().rejected.push(setting);
    }

    pub fn fail_status_reads(&self, fail: bool) {
        self.inner.lock().status_fault = fail;
    }

    pub fn set_rssi(&self, rssi_db: f64) {
        self.inner.lock().status.rssi_db = rssi_db;
    }

    /// Settings accepted so far, in order
    pub fn applied(&self) -> Vec<RadioSetting> {
        self.inner.lock().applied.clone()
    }

    pub fn init_calls(&self) -> u32 {
        self.inner.lock().init_calls
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioDevice for SimRadio {
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
            return Err(DeviceError::InitFailed {
                device: DEVICE,
                code: ETIMEDOUT,
            });
        }
        inner.ready = true;
        inner.status.ensm_mode = "fdd".into();
        debug!("sim radio initialised");
        Ok(())
    }

    fn configure(&self, setting: &RadioSetting) -> DeviceResult<()> {
        let mut inner = self.inner.lock();
        if !inner.ready {
            return Err(DeviceError::NotReady(DEVICE));
        }
        if inner.rejected.contains(&setting.name()) {
            return Err(DeviceError::ConfigureRejected {
                setting: setting.name(),
                code: EINVAL,
            });
        }

        let status = &mut inner.status;
        match setting {
            RadioSetting::Mode(mode) => status.ensm_mode = mode.as_hardware_str().into(),
            RadioSetting::LoFrequency { hz } => status.lo_hz = *hz,
            RadioSetting::SampleRate { hz } => status.sample_rate_hz = *hz,
            RadioSetting::Bandwidth { hz } => status.bandwidth_hz = *hz,
            RadioSetting::GainMode(mode) => status.gain_mode = mode.as_hardware_str().into(),
            RadioSetting::RxGain { db } => status.gain_db = *db,
            RadioSetting::TxGain { .. } | RadioSetting::Filter(_) => {}
        }
        inner.applied.push(setting.clone());
        Ok(())
    }

    fn read_status(&self) -> DeviceResult<RadioStatus> {
        let inner = self.inner.lock();
        if !inner.ready {
            return Err(DeviceError::NotReady(DEVICE));
        }
        if inner.status_fault {
            return Err(DeviceError::Read {
                code: i64::from(ETIMEDOUT),
            });
        }
        Ok(inner.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GainMode, OperatingMode};

    #[test]
    fn test_redundant_init_rejected() {
        let radio = SimRadio::new();
        radio.init().unwrap();
        assert_eq!(radio.init(), Err(DeviceError::AlreadyReady("radio")));
        assert!(radio.is_ready());
        assert_eq!(radio.init_calls(), 2);
    }

    #[test]
    fn test_configure_requires_init() {
        let radio = SimRadio::new();
        let err = radio.configure(&RadioSetting::LoFrequency { hz: 1 }).unwrap_err();
        assert_eq!(err, DeviceError::NotReady("radio"));
    }

    #[test]
    fn test_settings_reflected_in_status() {
        let radio = SimRadio::new();
        radio.init().unwrap();
        radio.configure(&RadioSetting::Mode(OperatingMode::Tdd)).unwrap();
        radio.configure(&RadioSetting::LoFrequency { hz: 8_450_000_000 }).unwrap();
        radio.configure(&RadioSetting::GainMode(GainMode::FastAttack)).unwrap();

        let status = radio.read_status().unwrap();
        assert_eq!(status.mode(), OperatingMode::Tdd);
        assert_eq!(status.lo_hz, 8_450_000_000);
        assert_eq!(status.gain_mode, "fast_attack");
        assert_eq!(radio.applied().len(), 3);
    }

    #[test]
    fn test_rejected_setting() {
        let radio = SimRadio::new();
        radio.init().unwrap();
        radio.reject("bandwidth");
        assert!(matches!(
            radio.configure(&RadioSetting::Bandwidth { hz: 1 }),
            Err(DeviceError::ConfigureRejected { setting: "bandwidth", .. })
        ));
        assert!(radio.applied().is_empty());
    }

    #[test]
    fn test_injected_init_failures() {
        let radio = SimRadio::new();
        radio.fail_next_inits(2);
        assert!(radio.init().is_err());
        assert!(radio.init().is_err());
        assert!(radio.init().is_ok());
    }
}
