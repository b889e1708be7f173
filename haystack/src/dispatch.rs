//! Remote command handling
//!
//! Planning is pure: [`plan_command`] and [`plan_config`] map the current
//! hardware snapshot plus a request to the effects to run. The
//! [`CommandDispatcher`] runs those effects against the devices, and the
//! [`CommandDispatchLoop`] feeds it frames from the link.
//!
//! | Request | Guard | Effect |
//! |---------|-------|--------|
//! | `XbandConfig` / `XbandSet` | addressed to this node, radio ready, no Sleep while armed | independent radio settings |
//! | `InitPll` | PLL not ready | synthesizer init + RX mode |
//! | `DisablePll` | PLL ready | synthesizer power-down |
//! | `ArmRx` | no receive loop, not armed | spawn receive loop |
//! | `DisarmRx` | receive loop running or armed | stop modem, cancel loop |
//! | `Poll` with cadence | non-zero seconds | new status poll interval |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use link_protocol::{Endpoint, Frame, Message, RadioMode, XbandCommand, XbandConfig, XbandSet};
use xband_devices::{
    DeviceError, GainMode, OperatingMode, RadioDevice, RadioSetting, SynthesizerDevice,
    TX_MUTE_DB,
};

use crate::error::{CommandError, LinkError, StateError};
use crate::link::LinkSession;
use crate::pacing::Sleeper;
use crate::receiver::RxController;
use crate::state::{HardwareSnapshot, HardwareStateStore, ModemState};

const DISCONNECTED_IDLE: Duration = Duration::from_millis(250);

/// Filter profile files carry this extension
const FILTER_EXTENSION: &str = "ftr";

// ============================================================================
// Planning
// ============================================================================

/// Effect of an `XbandCommand` given the current hardware state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPlan {
    /// Redundant request, warn and do nothing
    Skip(&'static str),
    InitPll,
    DisablePll,
    Arm,
    Disarm,
}

/// `rx_engaged` is true while a receive loop owns the slot, including one
/// still retrying init before the modem reports `Armed`
pub fn plan_command(
    snapshot: &HardwareSnapshot,
    rx_engaged: bool,
    command: XbandCommand,
) -> CommandPlan {
    let rx_active = rx_engaged || snapshot.is_armed();
    match command {
        XbandCommand::InitPll if snapshot.synthesizer_ready => {
            CommandPlan::Skip("PLL already initialised")
        }
        XbandCommand::InitPll => CommandPlan::InitPll,
        XbandCommand::DisablePll if !snapshot.synthesizer_ready => {
            CommandPlan::Skip("PLL already disabled")
        }
        XbandCommand::DisablePll => CommandPlan::DisablePll,
        XbandCommand::ArmRx if rx_active => CommandPlan::Skip("RX already armed"),
        XbandCommand::ArmRx => CommandPlan::Arm,
        XbandCommand::DisarmRx if !rx_active => CommandPlan::Skip("RX already disarmed"),
        XbandCommand::DisarmRx => CommandPlan::Disarm,
    }
}

/// Either configuration record shape
#[derive(Debug, Clone, Copy)]
pub enum RadioConfig<'a> {
    Full(&'a XbandConfig),
    Set(&'a XbandSet),
}

pub fn operating_mode(mode: RadioMode) -> OperatingMode {
    match mode {
        RadioMode::Sleep => OperatingMode::Sleep,
        RadioMode::Fdd => OperatingMode::Fdd,
        RadioMode::Tdd => OperatingMode::Tdd,
        RadioMode::Unknown => OperatingMode::Unknown,
    }
}

pub fn filter_path(filter_dir: &Path, name: &str) -> PathBuf {
    filter_dir.join(format!("{name}.{FILTER_EXTENSION}"))
}

fn mhz_to_hz(mhz: f32) -> i64 {
    (f64::from(mhz) * 1e6).round() as i64
}

/// Radio settings to apply, in order, or why the request is refused
pub fn plan_config(
    snapshot: &HardwareSnapshot,
    node: Endpoint,
    destination: Endpoint,
    config: RadioConfig<'_>,
    filter_dir: &Path,
) -> Result<Vec<RadioSetting>, StateError> {
    if destination != node {
        return Err(StateError::WrongDestination(destination));
    }
    if !snapshot.radio_ready {
        return Err(StateError::RadioNotReady);
    }

    let mut steps = Vec::with_capacity(8);
    match config {
        RadioConfig::Full(cfg) => {
            let mode = operating_mode(cfg.mode);
            if mode == OperatingMode::Sleep && snapshot.modem_state == ModemState::Armed {
                return Err(StateError::ArmedSleepRejected);
            }
            if mode != OperatingMode::Unknown {
                steps.push(RadioSetting::Mode(mode));
            }
            steps.push(RadioSetting::LoFrequency { hz: cfg.lo_hz });
            steps.push(RadioSetting::SampleRate {
                hz: cfg.sample_rate_hz,
            });
            steps.push(RadioSetting::Bandwidth {
                hz: cfg.bandwidth_hz,
            });
            steps.push(RadioSetting::GainMode(GainMode::from_hardware_str(
                &cfg.gain_mode,
            )));
            steps.push(RadioSetting::TxGain { db: TX_MUTE_DB });
            if !cfg.filter_name.is_empty() {
                steps.push(RadioSetting::Filter(filter_path(filter_dir, &cfg.filter_name)));
            }
        }
        RadioConfig::Set(set) => {
            steps.push(RadioSetting::LoFrequency {
                hz: mhz_to_hz(set.lo_mhz),
            });
            steps.push(RadioSetting::SampleRate {
                hz: i64::from(set.sample_rate_ksps) * 1000,
            });
            steps.push(RadioSetting::Bandwidth {
                hz: mhz_to_hz(set.bandwidth_mhz),
            });
            steps.push(RadioSetting::GainMode(GainMode::Manual));
            steps.push(RadioSetting::RxGain {
                db: f64::from(set.phy_gain),
            });
            steps.push(RadioSetting::Filter(filter_path(
                filter_dir,
                &format!("ftr{}", set.filter),
            )));
        }
    }
    Ok(steps)
}

// ============================================================================
// Execution
// ============================================================================

pub struct CommandDispatcher {
    store: Arc<HardwareStateStore>,
    radio: Arc<dyn RadioDevice>,
    synthesizer: Arc<dyn SynthesizerDevice>,
    rx: Arc<RxController>,
    link: Arc<LinkSession>,
    filter_dir: PathBuf,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<HardwareStateStore>,
        radio: Arc<dyn RadioDevice>,
        synthesizer: Arc<dyn SynthesizerDevice>,
        rx: Arc<RxController>,
        link: Arc<LinkSession>,
        filter_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            radio,
            synthesizer,
            rx,
            link,
            filter_dir,
        }
    }

    /// Dispatch one received frame; failures are logged, never returned
    pub fn handle(&self, frame: Frame) {
        debug!(
            kind = ?frame.kind,
            source = %frame.source,
            destination = %frame.destination,
            netstat = %frame.netstat,
            "Frame received"
        );

        let message = match frame.message() {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, kind = ?frame.kind, source = %frame.source, "Undecodable payload dropped");
                return;
            }
        };

        match message {
            Message::XbandConfig(cfg) => self.apply_config(frame.destination, RadioConfig::Full(&cfg)),
            Message::XbandSet(set) => {
                debug!(adar_gain = set.adar_gain, phase = ?set.phase, "Beam-former settings");
                self.apply_config(frame.destination, RadioConfig::Set(&set))
            }
            Message::XbandCommand(command) => match self.execute(command) {
                Ok(()) => {}
                Err(CommandError::State(err)) => warn!(?command, %err, "Command not applied"),
                Err(err) => error!(?command, %err, "Command failed"),
            },
            Message::Ack => info!(source = %frame.source, "Ack"),
            Message::Nack => warn!(source = %frame.source, "Nack"),
            Message::Error(text) => warn!(
                source = %frame.source,
                message = %String::from_utf8_lossy(&text),
                "Error frame"
            ),
            Message::Poll(Some(secs)) if secs > 0 => {
                let interval = Duration::from_secs(u64::from(secs));
                if interval != self.link.poll_interval() {
                    info!(?interval, "Status poll interval set by server");
                    self.link.set_poll_interval(interval);
                }
            }
            Message::Null | Message::Poll(_) => debug!(source = %frame.source, "Keep-alive"),
            other => debug!(kind = ?other.kind(), "Frame type not handled here"),
        }
    }

    /// Apply every planned setting; one failing step does not stop the rest
    pub fn apply_config(&self, destination: Endpoint, config: RadioConfig<'_>) {
        let snapshot = self.store.snapshot();
        let steps = match plan_config(
            &snapshot,
            self.link.endpoint(),
            destination,
            config,
            &self.filter_dir,
        ) {
            Ok(steps) => steps,
            Err(StateError::WrongDestination(dest)) => {
                info!(destination = %dest, "Configuration for another node ignored");
                return;
            }
            Err(err) => {
                error!(%err, "Configuration rejected");
                return;
            }
        };

        let total = steps.len();
        let applied = steps
            .iter()
            .filter(|step| match self.radio.configure(step) {
                Ok(()) => true,
                Err(err) => {
                    warn!(setting = step.name(), %err, "Radio setting failed");
                    false
                }
            })
            .count();
        info!(applied, total, "Radio configuration applied");
    }

    pub fn execute(&self, command: XbandCommand) -> Result<(), CommandError> {
        match plan_command(&self.store.snapshot(), self.rx.is_engaged(), command) {
            CommandPlan::Skip(reason) => {
                warn!(?command, "{reason}");
                Ok(())
            }
            CommandPlan::InitPll => {
                match self.synthesizer.init() {
                    Ok(()) => {}
                    Err(DeviceError::AlreadyReady(_)) => {
                        warn!("PLL already powered, switching it to receive mode")
                    }
                    Err(err) => return Err(err.into()),
                }
                self.synthesizer.start()?;
                self.store.set_synthesizer_ready(true);
                info!("PLL initialised in receive mode");
                Ok(())
            }
            CommandPlan::DisablePll => {
                self.synthesizer.stop()?;
                self.store.set_synthesizer_ready(false);
                info!("PLL powered down");
                Ok(())
            }
            CommandPlan::Arm => self.rx.arm(),
            CommandPlan::Disarm => self.rx.disarm(),
        }
    }
}

/// Network ingest: receive frames while connected, idle while not
pub struct CommandDispatchLoop {
    dispatcher: CommandDispatcher,
    link: Arc<LinkSession>,
    store: Arc<HardwareStateStore>,
    sleeper: Arc<dyn Sleeper>,
}

impl CommandDispatchLoop {
    pub fn new(
        dispatcher: CommandDispatcher,
        link: Arc<LinkSession>,
        store: Arc<HardwareStateStore>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            dispatcher,
            link,
            store,
            sleeper,
        }
    }

    pub fn run(&self) {
        let status = self.store.thread_status();
        while status.is_running() {
            if !self.link.is_connected() {
                if self.sleeper.sleep(DISCONNECTED_IDLE, status.token()) {
                    break;
                }
                continue;
            }

            match self.link.receive() {
                Ok(frame) => self.dispatcher.handle(frame),
                Err(err) if err.is_integrity() => warn!(%err, "Corrupt frame discarded"),
                Err(LinkError::NotConnected) => {}
                Err(err) => warn!(
                    %err,
                    reason = ?self.link.disconnect_reason(),
                    "Link lost, waiting for reconnect"
                ),
            }
        }
        debug!("Command dispatch loop stopped");
    }
}
