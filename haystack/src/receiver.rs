//! X-band RF ingest
//!
//! [`ReceiveLoop`] walks the modem from `NotReady` to `Armed` and then
//! drains bursts: receive, read, capture, forward as a `Data` frame to the
//! GUI client. [`RxController`] owns the single loop slot and serialises
//! arm and disarm against each other.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use link_protocol::{Endpoint, Message};
use xband_devices::{DeviceError, ModemDevice};

use crate::capture::CaptureWriter;
use crate::error::{CommandError, StateError};
use crate::link::LinkSession;
use crate::pacing::{CancelToken, Sleeper};
use crate::state::{HardwareStateStore, ModemState};

const GRACE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    /// Back-off between failed init/start attempts
    pub init_retry: Duration,
    pub max_init_attempts: u32,
    /// How long disarm waits for the loop to unwind
    pub disarm_grace: Duration,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            init_retry: Duration::from_secs(5),
            max_init_attempts: 5,
            disarm_grace: Duration::from_millis(100),
        }
    }
}

/// Why a receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    Shutdown,
    /// Arming failed `max_init_attempts` times in a row
    GaveUp,
    Fatal(DeviceError),
}

/// Everything a receive loop needs, cloned into each spawned loop
#[derive(Clone)]
pub struct ReceiverContext {
    pub store: Arc<HardwareStateStore>,
    pub modem: Arc<dyn ModemDevice>,
    pub link: Arc<LinkSession>,
    pub capture: Option<Arc<CaptureWriter>>,
    pub sleeper: Arc<dyn Sleeper>,
    pub settings: ReceiverSettings,
}

pub struct ReceiveLoop {
    ctx: ReceiverContext,
    cancel: CancelToken,
}

impl ReceiveLoop {
    pub fn new(ctx: ReceiverContext, cancel: CancelToken) -> Self {
        Self { ctx, cancel }
    }

    pub fn run(self) -> LoopExit {
        if !self.ctx.store.snapshot().synthesizer_ready {
            warn!("Arming RX while the PLL is not initialised");
        }

        let exit = self.drive();
        match &exit {
            LoopExit::Fatal(err) => {
                error!(%err, "FATAL: modem unrecoverable, shutting down");
                self.ctx.store.thread_status().fatal();
            }
            LoopExit::GaveUp => {
                error!(
                    attempts = self.ctx.settings.max_init_attempts,
                    "FATAL: modem could not be armed, shutting down"
                );
                self.ctx.store.thread_status().fatal();
            }
            LoopExit::Cancelled => info!("Receive loop cancelled"),
            LoopExit::Shutdown => info!("Receive loop stopped for shutdown"),
        }
        exit
    }

    fn stop_requested(&self) -> Option<LoopExit> {
        if self.cancel.is_cancelled() {
            Some(LoopExit::Cancelled)
        } else if !self.ctx.store.thread_status().is_running() {
            Some(LoopExit::Shutdown)
        } else {
            None
        }
    }

    fn drive(&self) -> LoopExit {
        let mut failures = 0;
        loop {
            if let Some(exit) = self.stop_requested() {
                return exit;
            }

            let result = match self.ctx.store.modem_state() {
                ModemState::Armed => self.receive_burst(),
                state => self.advance(state),
            };

            match result {
                Ok(()) => failures = 0,
                Err(err) if err.is_fatal() => return LoopExit::Fatal(err),
                Err(err) => {
                    failures += 1;
                    warn!(
                        %err,
                        attempt = failures,
                        max = self.ctx.settings.max_init_attempts,
                        "Modem arming failed"
                    );
                    if failures >= self.ctx.settings.max_init_attempts {
                        return LoopExit::GaveUp;
                    }
                    if self.ctx.sleeper.sleep(self.ctx.settings.init_retry, &self.cancel) {
                        return LoopExit::Cancelled;
                    }
                }
            }
        }
    }

    /// One step towards `Armed`
    fn advance(&self, state: ModemState) -> Result<(), DeviceError> {
        let modem = &self.ctx.modem;
        let next = match state {
            ModemState::NotReady => {
                match modem.init() {
                    Ok(()) => info!("Modem initialised"),
                    Err(DeviceError::AlreadyReady(_)) => {
                        warn!("Modem already initialised, adopting it")
                    }
                    Err(err) => return Err(err),
                }
                ModemState::Initialized
            }
            ModemState::Initialized => {
                modem.start()?;
                ModemState::Armed
            }
            ModemState::Armed => return Ok(()),
        };

        if self.cancel.is_cancelled() {
            if next == ModemState::Armed {
                // started after disarm already stopped the modem
                if let Err(err) = modem.stop() {
                    warn!(%err, "Modem stop after cancelled arm failed");
                }
            }
            return Ok(());
        }

        match self.ctx.store.compare_and_set_state(state, next) {
            Ok(()) if next == ModemState::Armed => info!("RX armed"),
            Ok(()) => {}
            Err(err) => debug!(%err, "Modem state moved underneath the receive loop"),
        }
        Ok(())
    }

    /// Drain one burst; only fatal errors escape
    fn receive_burst(&self) -> Result<(), DeviceError> {
        let ctx = &self.ctx;
        let code = match ctx.modem.receive() {
            Ok(len) if self.cancel.is_cancelled() => {
                debug!(len, "Receive returned after disarm, burst left unread");
                return Ok(());
            }
            Ok(len) => len as i64,
            Err(err) if err.is_fatal() => return Err(err),
            Err(DeviceError::Stopped) => {
                ctx.store.record_receive_result(DeviceError::Stopped.code());
                // disarm stops the modem before cancelling; wait for the token
                ctx.sleeper.sleep(ctx.settings.init_retry, &self.cancel);
                return Ok(());
            }
            Err(err) => {
                warn!(%err, "Modem receive failed");
                err.code()
            }
        };
        ctx.store.record_receive_result(code);
        if code <= 0 {
            return Ok(());
        }

        let expected = code as usize;
        let mut burst = vec![0u8; expected];
        match ctx.modem.read(&mut burst) {
            Ok(read) => {
                ctx.store.record_read_result(read as i64);
                if read != expected {
                    warn!(read, expected, "Short modem read, burst dropped");
                    return Ok(());
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                ctx.store.record_read_result(err.code());
                warn!(%err, "Modem read failed, burst dropped");
                return Ok(());
            }
        }

        if let Some(capture) = &ctx.capture {
            match capture.write(&burst) {
                Ok(path) => debug!(path = %path.display(), bytes = expected, "Burst captured"),
                Err(err) => warn!(%err, "Burst capture failed"),
            }
        }

        match Message::Data(burst).into_frame(ctx.link.endpoint(), Endpoint::Client) {
            Ok(frame) => {
                if let Err(err) = ctx.link.send(&frame) {
                    warn!(%err, bytes = expected, "Burst not forwarded");
                }
            }
            Err(err) => warn!(%err, "Burst too large to frame"),
        }
        Ok(())
    }
}

// ============================================================================
// Controller
// ============================================================================

struct Worker {
    handle: JoinHandle<LoopExit>,
    cancel: CancelToken,
}

/// Decrements the live-loop count however the loop thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the one receive loop slot
pub struct RxController {
    ctx: ReceiverContext,
    worker: Mutex<Option<Worker>>,
    active: Arc<AtomicUsize>,
}

impl RxController {
    pub fn new(ctx: ReceiverContext) -> Self {
        Self {
            ctx,
            worker: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Receive loop threads still alive, detached ones included
    pub fn active_loops(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// A loop owns the slot and has not finished
    pub fn is_engaged(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Spawn the receive loop; the loop itself walks the state to `Armed`
    ///
    /// Refused while any loop is alive, a detached one included.
    pub fn arm(&self) -> Result<(), CommandError> {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.take() {
            if !worker.handle.is_finished() {
                *slot = Some(worker);
                return Err(StateError::Redundant("RX already armed").into());
            }
            reap(worker);
        }
        if self.active_loops() > 0 {
            return Err(StateError::Redundant("previous RX loop still unwinding").into());
        }

        let cancel = CancelToken::new();
        let rx_loop = ReceiveLoop::new(self.ctx.clone(), cancel.clone());
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let handle = thread::Builder::new()
            .name("xband-rx".into())
            .spawn(move || {
                let _guard = guard;
                rx_loop.run()
            })
            .map_err(CommandError::Spawn)?;

        *slot = Some(Worker { handle, cancel });
        info!("Receive loop spawned");
        Ok(())
    }

    /// Stop the receive path and retire the loop
    pub fn disarm(&self) -> Result<(), CommandError> {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.take() else {
            return Err(StateError::Redundant("RX already disarmed").into());
        };

        if let Err(err) = self.ctx.modem.stop() {
            warn!(%err, "Modem stop failed");
        }
        worker.cancel.cancel();

        let deadline = Instant::now() + self.ctx.settings.disarm_grace;
        while !worker.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(GRACE_POLL);
        }

        if worker.handle.is_finished() {
            reap(worker);
            match self
                .ctx
                .store
                .compare_and_set_state(ModemState::Armed, ModemState::Initialized)
            {
                Ok(()) => info!("RX disarmed"),
                Err(err) => debug!(%err, "Disarmed before the modem was armed"),
            }
        } else {
            warn!(
                grace = ?self.ctx.settings.disarm_grace,
                "Receive loop did not unwind, detaching it; modem needs re-init"
            );
            self.ctx.store.force_modem_state(ModemState::NotReady);
        }
        Ok(())
    }

    /// Teardown: disarm if anything is running
    pub fn shutdown(&self) {
        match self.disarm() {
            Ok(()) | Err(CommandError::State(StateError::Redundant(_))) => {}
            Err(err) => warn!(%err, "Receive loop teardown failed"),
        }
    }
}

fn reap(worker: Worker) {
    match worker.handle.join() {
        Ok(exit) => debug!(?exit, "Receive loop reaped"),
        Err(_) => error!("Receive loop panicked"),
    }
}
