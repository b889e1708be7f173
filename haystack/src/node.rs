//! Wiring of the shared state, devices and loop threads

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

use xband_devices::sim::{SimModem, SimRadio, SimSynthesizer};
use xband_devices::{ModemDevice, RadioDevice, SynthesizerDevice};

use crate::capture::CaptureWriter;
use crate::config::{Backend, HaystackConfig};
use crate::dispatch::{CommandDispatchLoop, CommandDispatcher};
use crate::link::{DisconnectReason, LinkSession, LinkWatchdog};
use crate::pacing::Sleeper;
use crate::receiver::{ReceiverContext, RxController};
use crate::state::HardwareStateStore;
use crate::status::StatusPollLoop;

/// The three pieces of X-band hardware
#[derive(Clone)]
pub struct Devices {
    pub radio: Arc<dyn RadioDevice>,
    pub modem: Arc<dyn ModemDevice>,
    pub synthesizer: Arc<dyn SynthesizerDevice>,
}

impl Devices {
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Sim => Self {
                radio: Arc::new(SimRadio::new()),
                modem: Arc::new(SimModem::new()),
                synthesizer: Arc::new(SimSynthesizer::new()),
            },
        }
    }
}

/// A running Haystack node
pub struct Node {
    store: Arc<HardwareStateStore>,
    link: Arc<LinkSession>,
    rx: Arc<RxController>,
    watchdog: Option<JoinHandle<()>>,
    loops: Vec<JoinHandle<()>>,
}

impl Node {
    /// Build the shared state and start the watchdog, dispatch and status threads
    pub fn spawn(
        config: &HaystackConfig,
        devices: Devices,
        sleeper: Arc<dyn Sleeper>,
    ) -> io::Result<Self> {
        let store = Arc::new(HardwareStateStore::new());
        let link = Arc::new(LinkSession::new(config.link_settings()));
        let capture = config.capture.enabled.then(|| {
            Arc::new(CaptureWriter::new(
                config.capture.directory.clone(),
                config.capture.prefix.clone(),
            ))
        });

        let rx = Arc::new(RxController::new(ReceiverContext {
            store: Arc::clone(&store),
            modem: Arc::clone(&devices.modem),
            link: Arc::clone(&link),
            capture,
            sleeper: Arc::clone(&sleeper),
            settings: config.receiver_settings(),
        }));

        let watchdog = LinkWatchdog::new(
            Arc::clone(&link),
            Arc::clone(&store),
            Arc::clone(&sleeper),
            config.reconnect_interval(),
        );
        let dispatch = CommandDispatchLoop::new(
            CommandDispatcher::new(
                Arc::clone(&store),
                Arc::clone(&devices.radio),
                Arc::clone(&devices.synthesizer),
                Arc::clone(&rx),
                Arc::clone(&link),
                config.radio.filter_directory.clone(),
            ),
            Arc::clone(&link),
            Arc::clone(&store),
            Arc::clone(&sleeper),
        );
        let status = StatusPollLoop::new(
            Arc::clone(&store),
            Arc::clone(&devices.radio),
            Arc::clone(&link),
            sleeper,
            config.radio_retry(),
        );

        let mut node = Self {
            store,
            link,
            rx,
            watchdog: None,
            loops: Vec::with_capacity(2),
        };
        node.watchdog = Some(node.spawn_thread("link-watchdog", move || watchdog.run())?);
        let dispatch = node.spawn_thread("net-dispatch", move || dispatch.run())?;
        node.loops.push(dispatch);
        let status = node.spawn_thread("status-poll", move || status.run())?;
        node.loops.push(status);

        info!(
            server = %format!("{}:{}", config.server.address, config.server.port),
            node = %config.node.endpoint,
            backend = ?config.backend,
            "Haystack node started"
        );
        Ok(node)
    }

    fn spawn_thread(
        &self,
        name: &str,
        body: impl FnOnce() + Send + 'static,
    ) -> io::Result<JoinHandle<()>> {
        let spawned = thread::Builder::new().name(name.into()).spawn(body);
        if spawned.is_err() {
            // partial startup; stop whatever already runs
            self.store.thread_status().fatal();
        }
        spawned
    }

    pub fn store(&self) -> &Arc<HardwareStateStore> {
        &self.store
    }

    pub fn link(&self) -> &Arc<LinkSession> {
        &self.link
    }

    pub fn rx(&self) -> &Arc<RxController> {
        &self.rx
    }

    /// Block until some loop or a signal drives the status non-positive
    pub fn wait(&self) {
        self.store.thread_status().wait();
    }

    /// Stop every loop and return the process exit code
    pub fn shutdown(mut self) -> i32 {
        let status = self.store.thread_status();
        status.shutdown();

        // no reconnect may race the socket teardown below
        if let Some(watchdog) = self.watchdog.take() {
            join("link-watchdog", watchdog);
        }
        self.rx.shutdown();
        self.link.disconnect(DisconnectReason::None);
        for handle in self.loops.drain(..) {
            join("loop", handle);
        }
        status.exit_code()
    }
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!(thread = name, "Thread panicked");
    }
}
