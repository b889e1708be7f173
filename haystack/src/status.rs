//! Periodic status reporting
//!
//! Brings the radio up (with back-off) and then, every poll interval while
//! the link is connected, sends an `XbandStatus` frame to the GUI client.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use link_protocol::{Endpoint, Message, RadioMode, XbandStatus};
use xband_devices::{DeviceError, OperatingMode, RadioDevice, RadioStatus};

use crate::link::LinkSession;
use crate::pacing::Sleeper;
use crate::state::{HardwareSnapshot, HardwareStateStore};

pub fn radio_mode(mode: OperatingMode) -> RadioMode {
    match mode {
        OperatingMode::Sleep => RadioMode::Sleep,
        OperatingMode::Fdd => RadioMode::Fdd,
        OperatingMode::Tdd => RadioMode::Tdd,
        OperatingMode::Unknown => RadioMode::Unknown,
    }
}

/// Merge radio readings with the hardware record
pub fn status_payload(
    snapshot: &HardwareSnapshot,
    radio: &RadioStatus,
    timestamp_unix: i64,
) -> XbandStatus {
    XbandStatus {
        mode: radio_mode(radio.mode()),
        lo_hz: radio.lo_hz,
        sample_rate_hz: radio.sample_rate_hz,
        bandwidth_hz: radio.bandwidth_hz,
        temperature_mc: radio.temperature_mc,
        rssi_db: radio.rssi_db,
        gain_db: radio.gain_db,
        gain_mode: radio.gain_mode.clone(),
        modem_ready: snapshot.modem_ready(),
        pll_ready: snapshot.synthesizer_ready,
        radio_ready: snapshot.radio_ready,
        rx_armed: snapshot.is_armed(),
        last_receive_result: snapshot.last_receive_result,
        last_read_result: snapshot.last_read_result,
        timestamp_unix,
    }
}

pub struct StatusPollLoop {
    store: Arc<HardwareStateStore>,
    radio: Arc<dyn RadioDevice>,
    link: Arc<LinkSession>,
    sleeper: Arc<dyn Sleeper>,
    radio_retry: Duration,
}

impl StatusPollLoop {
    pub fn new(
        store: Arc<HardwareStateStore>,
        radio: Arc<dyn RadioDevice>,
        link: Arc<LinkSession>,
        sleeper: Arc<dyn Sleeper>,
        radio_retry: Duration,
    ) -> Self {
        Self {
            store,
            radio,
            link,
            sleeper,
            radio_retry,
        }
    }

    pub fn run(&self) {
        let status = self.store.thread_status();
        while status.is_running() {
            let wait = if self.store.snapshot().radio_ready {
                self.report();
                self.link.poll_interval()
            } else {
                match self.bring_up_radio() {
                    Ok(()) => continue,
                    Err(err) if err.is_fatal() => {
                        error!(%err, "FATAL: radio unrecoverable, shutting down");
                        status.fatal();
                        break;
                    }
                    Err(err) => {
                        warn!(%err, retry_in = ?self.radio_retry, "Radio init failed");
                        self.radio_retry
                    }
                }
            };
            if self.sleeper.sleep(wait, status.token()) {
                break;
            }
        }
        debug!("Status poll loop stopped");
    }

    fn bring_up_radio(&self) -> Result<(), DeviceError> {
        match self.radio.init() {
            Ok(()) => info!("Radio initialised"),
            Err(DeviceError::AlreadyReady(_)) => debug!("Radio was already up"),
            Err(err) => return Err(err),
        }
        self.store.set_radio_ready(true);
        Ok(())
    }

    /// Sample and send one status frame if the link is up
    pub fn report(&self) {
        if !self.link.is_connected() {
            return;
        }
        let radio = self.radio.read_status().unwrap_or_else(|err| {
            warn!(%err, "Radio status read failed, reporting defaults");
            RadioStatus::default()
        });
        let payload = status_payload(&self.store.snapshot(), &radio, Utc::now().timestamp());

        match Message::XbandStatus(payload).into_frame(self.link.endpoint(), Endpoint::Client) {
            Ok(frame) => {
                if let Err(err) = self.link.send(&frame) {
                    warn!(%err, "Status frame not sent");
                }
            }
            Err(err) => warn!(%err, "Status frame not built"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ModemState;

    #[test]
    fn test_payload_reproduces_snapshot() {
        let snapshot = HardwareSnapshot {
            modem_state: ModemState::Armed,
            radio_ready: true,
            synthesizer_ready: false,
            last_receive_result: -110,
            last_read_result: 4096,
        };
        let radio = RadioStatus {
            bandwidth_hz: 20_000_000,
            gain_db: 71.0,
            gain_mode: "manual".into(),
            lo_hz: 8_212_500_000,
            rssi_db: -64.75,
            sample_rate_hz: 30_720_000,
            temperature_mc: 45_125,
            ensm_mode: "fdd".into(),
        };

        let payload = status_payload(&snapshot, &radio, 1_760_000_123);
        let decoded = XbandStatus::decode(&payload.encode()).unwrap();

        assert_eq!(decoded.mode, RadioMode::Fdd);
        assert!(decoded.modem_ready && decoded.rx_armed && decoded.radio_ready);
        assert!(!decoded.pll_ready);
        assert_eq!(decoded.last_receive_result, -110);
        assert_eq!(decoded.last_read_result, 4096);
        assert_eq!(decoded.lo_hz, 8_212_500_000);
        assert_eq!(decoded.rssi_db, -64.75);
        assert_eq!(decoded.gain_mode, "manual");
        assert_eq!(decoded.timestamp_unix, 1_760_000_123);
    }

    #[test]
    fn test_modem_ready_from_state() {
        let mut snapshot = HardwareSnapshot {
            modem_state: ModemState::NotReady,
            radio_ready: false,
            synthesizer_ready: false,
            last_receive_result: 0,
            last_read_result: 0,
        };
        let payload = status_payload(&snapshot, &RadioStatus::default(), 0);
        assert!(!payload.modem_ready);
        assert_eq!(payload.mode, RadioMode::Unknown);

        snapshot.modem_state = ModemState::Initialized;
        let payload = status_payload(&snapshot, &RadioStatus::default(), 0);
        assert!(payload.modem_ready && !payload.rx_armed);
    }
}
