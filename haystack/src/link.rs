//! TCP link to the ground station server
//!
//! ```text
//!                 watchdog fires              connect ok
//! Disconnected ─────────────────▶ Connecting ─────────────▶ Connected
//!      ▲                              │                         │
//!      └───── timeout / refused ──────┘                         │
//!      └──────── zero read, receive timeout, forced close ──────┘
//! ```
//!
//! Writes from every loop share one send lock so frames never interleave.
//! Only the command dispatch loop reads. Each (re)connect installs a fresh
//! socket tagged with a generation number, and teardown of an old socket
//! never touches a newer one.

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use link_protocol::{Endpoint, Frame, FrameDecoder, FrameType, NetStat};

use crate::error::{LinkError, LinkResult};
use crate::pacing::Sleeper;
use crate::state::HardwareStateStore;

const READ_CHUNK: usize = 64 * 1024;

/// Why the last connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    None,
    /// The server closed the socket
    ServerForced,
    /// No traffic within the receive timeout
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub address: String,
    pub port: u16,
    /// This node's identity on the network
    pub node: Endpoint,
    pub connect_timeout: Duration,
    /// Inactivity after which an established link is considered dead
    pub recv_timeout: Duration,
    pub poll_interval: Duration,
}

struct ReadSide {
    stream: Option<TcpStream>,
    generation: u64,
    decoder: FrameDecoder,
    scratch: Vec<u8>,
}

struct WriteSide {
    stream: Option<TcpStream>,
    generation: u64,
}

pub struct LinkSession {
    settings: LinkSettings,
    // lock order: reader before writer
    reader: Mutex<ReadSide>,
    writer: Mutex<WriteSide>,
    generation: AtomicU64,
    ready: AtomicBool,
    reason: Mutex<DisconnectReason>,
    netstat: AtomicU8,
    poll_interval_ms: AtomicU64,
}

impl LinkSession {
    pub fn new(settings: LinkSettings) -> Self {
        let poll_interval_ms = settings.poll_interval.as_millis() as u64;
        Self {
            settings,
            reader: Mutex::new(ReadSide {
                stream: None,
                generation: 0,
                decoder: FrameDecoder::new(),
                scratch: vec![0u8; READ_CHUNK],
            }),
            writer: Mutex::new(WriteSide {
                stream: None,
                generation: 0,
            }),
            generation: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            reason: Mutex::new(DisconnectReason::None),
            netstat: AtomicU8::new(0),
            poll_interval_ms: AtomicU64::new(poll_interval_ms),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.settings.node
    }

    pub fn is_connected(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn disconnect_reason(&self) -> DisconnectReason {
        *self.reason.lock()
    }

    /// Network status bitmask from the most recent frame
    pub fn netstat(&self) -> NetStat {
        NetStat(self.netstat.load(Ordering::Relaxed))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    /// Successful socket connects so far
    pub fn connections(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn resolve(&self) -> LinkResult<SocketAddr> {
        let target = (self.settings.address.as_str(), self.settings.port);
        target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                LinkError::Resolve(format!("{}:{}", self.settings.address, self.settings.port))
            })
    }

    /// Open a fresh connection and announce this node to the server
    pub fn connect(&self) -> LinkResult<()> {
        let addr = self.resolve()?;
        let stream =
            TcpStream::connect_timeout(&addr, self.settings.connect_timeout).map_err(|err| {
                match err.kind() {
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout {
                        addr: addr.to_string(),
                    },
                    io::ErrorKind::ConnectionRefused => LinkError::Refused {
                        addr: addr.to_string(),
                    },
                    _ => LinkError::Socket(err),
                }
            })?;
        stream.set_read_timeout(Some(self.settings.recv_timeout))?;
        stream.set_write_timeout(Some(self.settings.recv_timeout))?;
        stream.set_nodelay(true)?;
        let write_half = stream.try_clone()?;

        let generation = {
            let mut reader = self.reader.lock();
            let mut writer = self.writer.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            reader.stream = Some(stream);
            reader.generation = generation;
            reader.decoder.clear();
            if let Some(stale) = writer.stream.replace(write_half) {
                shutdown_quietly(&stale);
            }
            writer.generation = generation;
            generation
        };

        let hello = Frame::empty(FrameType::Null, self.settings.node, Endpoint::Server);
        if let Err(err) = self.write_frame(&hello) {
            self.drop_connection(generation, DisconnectReason::None);
            return Err(err);
        }

        *self.reason.lock() = DisconnectReason::None;
        self.ready.store(true, Ordering::SeqCst);
        info!(server = %addr, node = %self.settings.node, generation, "Link connected");
        Ok(())
    }

    /// Send one frame; fails without writing when disconnected
    pub fn send(&self, frame: &Frame) -> LinkResult<()> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.write_frame(frame)
    }

    fn write_frame(&self, frame: &Frame) -> LinkResult<()> {
        let bytes = frame.encode();
        let mut writer = self.writer.lock();
        let generation = writer.generation;
        let stream = writer.stream.as_mut().ok_or(LinkError::NotConnected)?;
        let result = write_fully(stream, &bytes);
        drop(writer);

        if let Err(err) = &result {
            self.drop_connection(generation, err.disconnect_reason());
        }
        result
    }

    /// Block until the next frame
    ///
    /// A corrupt frame comes back as [`LinkError::Integrity`] with the link
    /// still up. Any other error leaves the session disconnected.
    pub fn receive(&self) -> LinkResult<Frame> {
        let mut guard = self.reader.lock();
        let side = &mut *guard;
        loop {
            if let Some(decoded) = side.decoder.next_frame() {
                let frame = decoded?;
                self.netstat.store(frame.netstat.0, Ordering::Relaxed);
                return Ok(frame);
            }

            let Some(stream) = side.stream.as_mut() else {
                return Err(LinkError::NotConnected);
            };
            let err = match stream.read(&mut side.scratch) {
                Ok(0) => LinkError::PeerClosed,
                Ok(n) => {
                    side.decoder.push(&side.scratch[..n]);
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => LinkError::TimedOut,
                Err(e) => LinkError::Socket(e),
            };

            side.stream = None;
            side.decoder.clear();
            self.drop_connection(side.generation, err.disconnect_reason());
            return Err(err);
        }
    }

    /// Force the link down; the watchdog reconnects
    pub fn disconnect(&self, reason: DisconnectReason) {
        let generation = self.writer.lock().generation;
        self.drop_connection(generation, reason);
    }

    fn drop_connection(&self, generation: u64, reason: DisconnectReason) {
        let mut writer = self.writer.lock();
        if writer.generation != generation {
            return;
        }
        if let Some(stream) = writer.stream.take() {
            shutdown_quietly(&stream);
        }
        drop(writer);

        if self.ready.swap(false, Ordering::SeqCst) {
            *self.reason.lock() = reason;
            warn!(?reason, generation, "Link disconnected");
        }
    }
}

fn write_fully(stream: &mut TcpStream, bytes: &[u8]) -> LinkResult<()> {
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => {
                return Err(LinkError::ShortWrite {
                    written,
                    expected: bytes.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Err(LinkError::TimedOut),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn shutdown_quietly(stream: &TcpStream) {
    if let Err(err) = stream.shutdown(Shutdown::Both) {
        debug!(%err, "Socket already shut down");
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Reconnects the session whenever it is found disconnected
pub struct LinkWatchdog {
    session: Arc<LinkSession>,
    store: Arc<HardwareStateStore>,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
}

impl LinkWatchdog {
    pub fn new(
        session: Arc<LinkSession>,
        store: Arc<HardwareStateStore>,
        sleeper: Arc<dyn Sleeper>,
        interval: Duration,
    ) -> Self {
        Self {
            session,
            store,
            sleeper,
            interval,
        }
    }

    pub fn run(&self) {
        let status = self.store.thread_status();
        while status.is_running() {
            if !self.session.is_connected() {
                if let Err(err) = self.session.connect() {
                    warn!(
                        %err,
                        last_reason = ?self.session.disconnect_reason(),
                        retry_in = ?self.interval,
                        "Connect failed"
                    );
                }
            }
            if self.sleeper.sleep(self.interval, status.token()) {
                break;
            }
        }
        debug!("Link watchdog stopped");
    }
}
