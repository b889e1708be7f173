//! Haystack X-band Radio-Link Client
//!
//! Bridges the X-band front-end (receiver modem, PLL synthesizer, RF
//! transceiver) to the ground station network server.
//!
//! # Threads
//!
//! | Thread | Loop | Blocks on |
//! |--------|------|-----------|
//! | `link-watchdog` | [`LinkWatchdog`] | reconnect cadence |
//! | `net-dispatch` | [`CommandDispatchLoop`] | socket receive |
//! | `status-poll` | [`StatusPollLoop`] | poll interval |
//! | `xband-rx` | [`ReceiveLoop`], spawned on arm | modem receive |
//!
//! All of them share one [`HardwareStateStore`] and one [`LinkSession`] and
//! exit once the store's [`ThreadStatus`] goes non-positive.

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod node;
pub mod pacing;
pub mod receiver;
pub mod state;
pub mod status;

pub use capture::CaptureWriter;
pub use config::{Backend, ConfigError, HaystackConfig};
pub use dispatch::{
    plan_command, plan_config, CommandDispatchLoop, CommandDispatcher, CommandPlan, RadioConfig,
};
pub use error::{CommandError, LinkError, StateError};
pub use link::{DisconnectReason, LinkSession, LinkSettings, LinkWatchdog};
pub use node::{Devices, Node};
pub use pacing::{CancelToken, InstantSleeper, Sleeper, ThreadSleeper};
pub use receiver::{LoopExit, ReceiveLoop, ReceiverContext, ReceiverSettings, RxController};
pub use state::{HardwareSnapshot, HardwareStateStore, ModemState, ThreadStatus};
pub use status::StatusPollLoop;
