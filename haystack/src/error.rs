//! Error types for the link, the hardware state machine and command handling

use std::io;

use link_protocol::{Endpoint, FrameError};
use thiserror::Error;
use xband_devices::DeviceError;

use crate::link::DisconnectReason;
use crate::state::ModemState;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Link not connected")]
    NotConnected,
    #[error("Connect to {addr} timed out")]
    Timeout { addr: String },
    #[error("Connection refused by {addr}")]
    Refused { addr: String },
    #[error("Socket error: {0}")]
    Socket(#[from] io::Error),
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("Server closed the connection")]
    PeerClosed,
    #[error("No traffic within the receive timeout")]
    TimedOut,
    #[error("Corrupt frame: {0}")]
    Integrity(#[from] FrameError),
    #[error("Cannot resolve server address {0}")]
    Resolve(String),
}

impl LinkError {
    /// Corrupt frames are dropped without tearing the link down
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Reason recorded when this error ends a connection
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::PeerClosed => DisconnectReason::ServerForced,
            Self::TimedOut => DisconnectReason::TimedOut,
            Self::Socket(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::BrokenPipe
                ) =>
            {
                DisconnectReason::ServerForced
            }
            _ => DisconnectReason::None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Redundant command: {0}")]
    Redundant(&'static str),
    #[error("Modem state is {actual}, expected {expected}")]
    Conflict {
        expected: ModemState,
        actual: ModemState,
    },
    #[error("RX is armed: refusing to put the radio to sleep")]
    ArmedSleepRejected,
    #[error("Radio is not ready")]
    RadioNotReady,
    #[error("Configuration addressed to {0}")]
    WrongDestination(Endpoint),
}

/// Failure of a single remote command; the dispatch loop logs it and moves on
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Cannot spawn receive loop: {0}")]
    Spawn(io::Error),
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reasons() {
        assert_eq!(
            LinkError::PeerClosed.disconnect_reason(),
            DisconnectReason::ServerForced
        );
        assert_eq!(
            LinkError::TimedOut.disconnect_reason(),
            DisconnectReason::TimedOut
        );
        assert_eq!(
            LinkError::Socket(io::ErrorKind::ConnectionReset.into()).disconnect_reason(),
            DisconnectReason::ServerForced
        );
        assert_eq!(
            LinkError::Socket(io::ErrorKind::Other.into()).disconnect_reason(),
            DisconnectReason::None
        );
    }

    #[test]
    fn test_integrity_is_recoverable() {
        let err = LinkError::from(FrameError::BadTerminator(0));
        assert!(err.is_integrity());
        assert!(!LinkError::PeerClosed.is_integrity());
    }
}
