//! Ground Station Network Link Protocol
//!
//! NetFrame codec shared by every node on the ground station network
//! (GUI client, roof UHF, roof X-band, Haystack, server).
//!
//! # Wire Layout
//!
//! All multi-byte fields are little-endian.
//!
//! ```text
//! ┌────────┬──────┬────────┬──────┬─────────┬──────────────┬────────────┬─────────┬─────────────┬────────────┐
//! │ GUID   │ type │ source │ dest │ netstat │ payload_size │ header CRC │ payload │ payload CRC │ terminator │
//! │ 0x1A1C │ u8   │ u8     │ u8   │ u8      │ u32          │ u16        │ N bytes │ u16         │ 0xAAAA     │
//! └────────┴──────┴────────┴──────┴─────────┴──────────────┴────────────┴─────────┴─────────────┴────────────┘
//! ```
//!
//! The header CRC covers the ten bytes before it, the payload CRC covers the
//! payload only. Both are CRC-16/CCITT-FALSE.
//!
//! # Integrity Handling
//!
//! | Condition | Decoder action |
//! |-----------|----------------|
//! | Junk before a GUID | Discarded silently |
//! | Header CRC mismatch | One byte dropped, error reported, scan resumes |
//! | Payload CRC mismatch | Whole frame dropped, error reported |
//! | Bad terminator | One byte dropped, error reported |
//! | Oversized payload | One byte dropped, error reported |
//!
//! A corrupt frame never poisons the stream: the next valid frame decodes
//! normally.

use thiserror::Error;

pub mod crc;
pub mod decoder;
pub mod frame;
pub mod payload;

pub use decoder::FrameDecoder;
pub use frame::{Endpoint, Frame, FrameType, NetStat};
pub use payload::{Message, RadioMode, XbandCommand, XbandConfig, XbandSet, XbandStatus};

/// Frame start marker
pub const GUID: u16 = 0x1A1C;

/// Frame end marker
pub const TERMINATOR: u16 = 0xAAAA;

/// GUID + type + source + dest + netstat + payload_size + header CRC
pub const HEADER_LEN: usize = 12;

/// Payload CRC + terminator
pub const TRAILER_LEN: usize = 4;

/// Largest payload a frame may carry (1 MiB)
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Bad frame GUID: {0:#06x}")]
    BadGuid(u16),
    #[error("Header CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    HeaderCrc { expected: u16, actual: u16 },
    #[error("Payload CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    PayloadCrc { expected: u16, actual: u16 },
    #[error("Bad frame terminator: {0:#06x}")]
    BadTerminator(u16),
    #[error("Payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit")]
    Oversized(usize),
    #[error("Frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("Unknown endpoint code: {0}")]
    UnknownEndpoint(u8),
    #[error("Unknown X-band command code: {0}")]
    UnknownCommand(i32),
    #[error("{kind:?} payload too short: need {needed} bytes, have {available}")]
    PayloadTooShort {
        kind: FrameType,
        needed: usize,
        available: usize,
    },
    #[error("Unexpected {0:?} frame for this payload")]
    WrongType(FrameType),
}

pub type Result<T> = std::result::Result<T, FrameError>;
