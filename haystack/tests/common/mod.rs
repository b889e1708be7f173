#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use haystack::{Devices, HaystackConfig, InstantSleeper, Node};
use link_protocol::{Endpoint, Frame, FrameDecoder, Message, XbandCommand, XbandStatus};
use xband_devices::sim::{SimModem, SimRadio, SimSynthesizer};

pub const WAIT: Duration = Duration::from_secs(10);

/// Loopback stand-in for the ground station server
pub struct TestServer {
    listener: TcpListener,
}

impl TestServer {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn accept(&self) -> Peer {
        let deadline = Instant::now() + WAIT;
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => return Peer::new(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    assert!(Instant::now() < deadline, "node never connected");
                    thread::sleep(Duration::from_millis(2));
                }
                Err(e) => panic!("accept failed: {e}"),
            }
        }
    }
}

/// Server side of one node connection; frames are drained on a helper thread
pub struct Peer {
    stream: TcpStream,
    frames: Receiver<Frame>,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        stream.set_nonblocking(false).unwrap();
        let mut reader = stream.try_clone().unwrap();
        let (tx, frames) = mpsc::channel();
        thread::spawn(move || {
            let mut decoder = FrameDecoder::new();
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    break;
                }
                decoder.push(&buf[..n]);
                while let Some(decoded) = decoder.next_frame() {
                    if let Ok(frame) = decoded {
                        if tx.send(frame).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Self { stream, frames }
    }

    pub fn send(&mut self, frame: &Frame) {
        self.stream.write_all(&frame.encode()).unwrap();
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    pub fn command(&mut self, command: XbandCommand) {
        let frame = Message::XbandCommand(command)
            .into_frame(Endpoint::Server, Endpoint::Haystack)
            .unwrap();
        self.send(&frame);
    }

    /// First frame matching `pred`, skipping the rest
    pub fn expect(&self, what: &str, pred: impl Fn(&Frame) -> bool) -> Frame {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.frames.recv_timeout(left) {
                Ok(frame) if pred(&frame) => return frame,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => panic!("no {what} within {WAIT:?}"),
                Err(RecvTimeoutError::Disconnected) => panic!("link closed waiting for {what}"),
            }
        }
    }

    pub fn expect_status(&self, what: &str, pred: impl Fn(&XbandStatus) -> bool) -> XbandStatus {
        let frame = self.expect(what, |frame| match frame.message() {
            Ok(Message::XbandStatus(status)) => pred(&status),
            _ => false,
        });
        match frame.message() {
            Ok(Message::XbandStatus(status)) => status,
            other => panic!("expected status, got {other:?}"),
        }
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Simulated hardware kept reachable for inspection
pub struct Bench {
    pub radio: Arc<SimRadio>,
    pub modem: Arc<SimModem>,
    pub synth: Arc<SimSynthesizer>,
    pub sleeper: Arc<InstantSleeper>,
}

impl Bench {
    pub fn new() -> Self {
        Self {
            radio: Arc::new(SimRadio::new()),
            modem: Arc::new(SimModem::with_wait(Duration::from_millis(5))),
            synth: Arc::new(SimSynthesizer::new()),
            sleeper: Arc::new(InstantSleeper::new()),
        }
    }

    pub fn devices(&self) -> Devices {
        Devices {
            radio: self.radio.clone(),
            modem: self.modem.clone(),
            synthesizer: self.synth.clone(),
        }
    }

    pub fn start(&self, config: &HaystackConfig) -> Node {
        Node::spawn(config, self.devices(), self.sleeper.clone()).unwrap()
    }
}

pub fn config(port: u16) -> HaystackConfig {
    let mut config = HaystackConfig::default();
    config.server.port = port;
    config.server.connect_timeout_secs = 1;
    config.capture.enabled = false;
    config
}

pub fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}
