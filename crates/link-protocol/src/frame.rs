//! NetFrame header, routing, and encode/decode

use crate::crc::crc16;
use crate::{FrameError, Result, GUID, HEADER_LEN, MAX_PAYLOAD_LEN, TERMINATOR, TRAILER_LEN};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Frame Type
// ============================================================================

/// Message kind carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Null,
    Poll,
    Ack,
    Nack,
    Data,
    UhfConfig,
    XbandConfig,
    XbandSet,
    XbandCommand,
    XbandStatus,
    Error,
    /// Code this build does not know; kept so the frame can be skipped, not rejected
    Unknown(u8),
}

impl FrameType {
    pub fn code(&self) -> u8 {
        match self {
            Self::Null => 0x00,
            Self::Poll => 0x01,
            Self::Ack => 0x02,
            Self::Nack => 0x03,
            Self::Data => 0x04,
            Self::UhfConfig => 0x05,
            Self::XbandConfig => 0x06,
            Self::XbandSet => 0x07,
            Self::XbandCommand => 0x08,
            Self::XbandStatus => 0x09,
            Self::Error => 0x0A,
            Self::Unknown(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Null,
            0x01 => Self::Poll,
            0x02 => Self::Ack,
            0x03 => Self::Nack,
            0x04 => Self::Data,
            0x05 => Self::UhfConfig,
            0x06 => Self::XbandConfig,
            0x07 => Self::XbandSet,
            0x08 => Self::XbandCommand,
            0x09 => Self::XbandStatus,
            0x0A => Self::Error,
            other => Self::Unknown(other),
        }
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Logical participant in the ground station network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// GUI client
    Client,
    RoofUhf,
    RoofXband,
    Haystack,
    Server,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Client,
        Endpoint::RoofUhf,
        Endpoint::RoofXband,
        Endpoint::Haystack,
        Endpoint::Server,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Self::Client => 0x01,
            Self::RoofUhf => 0x02,
            Self::RoofXband => 0x03,
            Self::Haystack => 0x04,
            Self::Server => 0x05,
        }
    }

    /// Bit this endpoint occupies in the server's NetStat mask
    fn netstat_bit(&self) -> u8 {
        match self {
            Self::Client => 0x80,
            Self::RoofUhf => 0x40,
            Self::RoofXband => 0x20,
            Self::Haystack => 0x10,
            Self::Server => 0x08,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::RoofUhf => "roof_uhf",
            Self::RoofXband => "roof_xband",
            Self::Haystack => "haystack",
            Self::Server => "server",
        }
    }
}

impl TryFrom<u8> for Endpoint {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.code() == code)
            .ok_or(FrameError::UnknownEndpoint(code))
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == normalized || (normalized == "gui" && *e == Self::Client))
            .ok_or_else(|| format!("unknown endpoint '{}'", s))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// NetStat
// ============================================================================

/// Server-maintained mask of which endpoints currently hold a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetStat(pub u8);

impl NetStat {
    pub fn is_connected(&self, endpoint: Endpoint) -> bool {
        self.0 & endpoint.netstat_bit() != 0
    }

    pub fn with(self, endpoint: Endpoint) -> Self {
        NetStat(self.0 | endpoint.netstat_bit())
    }

    pub fn connected(&self) -> impl Iterator<Item = Endpoint> + '_ {
        Endpoint::ALL.into_iter().filter(|e| self.is_connected(*e))
    }
}

impl fmt::Display for NetStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.connected().map(|e| e.as_str()).collect();
        if names.is_empty() {
            write!(f, "{:#04x} (none)", self.0)
        } else {
            write!(f, "{:#04x} ({})", self.0, names.join(", "))
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// Validated fixed-size header; endpoints are still raw codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameType,
    pub source: u8,
    pub destination: u8,
    pub netstat: NetStat,
    pub payload_len: usize,
}

impl FrameHeader {
    /// Parse and integrity-check the first `HEADER_LEN` bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let mut cursor = &bytes[..HEADER_LEN];
        let guid = read_u16(&mut cursor)?;
        if guid != GUID {
            return Err(FrameError::BadGuid(guid));
        }
        let kind = FrameType::from_code(read_u8(&mut cursor)?);
        let source = read_u8(&mut cursor)?;
        let destination = read_u8(&mut cursor)?;
        let netstat = NetStat(read_u8(&mut cursor)?);
        let payload_len = read_u32(&mut cursor)? as usize;
        let stored_crc = read_u16(&mut cursor)?;

        let computed = crc16(&bytes[..HEADER_LEN - 2]);
        if computed != stored_crc {
            return Err(FrameError::HeaderCrc {
                expected: stored_crc,
                actual: computed,
            });
        }
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(FrameError::Oversized(payload_len));
        }

        Ok(Self {
            kind,
            source,
            destination,
            netstat,
            payload_len,
        })
    }

    /// Full on-wire length of the frame this header introduces
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload_len + TRAILER_LEN
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One unit of the network wire protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameType,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub netstat: NetStat,
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(
        kind: FrameType,
        source: Endpoint,
        destination: Endpoint,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::Oversized(payload.len()));
        }
        Ok(Self {
            kind,
            source,
            destination,
            netstat: NetStat::default(),
            payload,
        })
    }

    /// Frame with no payload (Null, Poll, Ack, Nack)
    pub fn empty(kind: FrameType, source: Endpoint, destination: Endpoint) -> Self {
        Self {
            kind,
            source,
            destination,
            netstat: NetStat::default(),
            payload: Vec::new(),
        }
    }

    pub fn with_netstat(mut self, netstat: NetStat) -> Self {
        self.netstat = netstat;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + TRAILER_LEN
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&GUID.to_le_bytes());
        out.push(self.kind.code());
        out.push(self.source.code());
        out.push(self.destination.code());
        out.push(self.netstat.0);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        let header_crc = crc16(&out[start..]);
        out.extend_from_slice(&header_crc.to_le_bytes());

        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&crc16(&self.payload).to_le_bytes());
        out.extend_from_slice(&TERMINATOR.to_le_bytes());
    }

    /// Decode one frame from the start of `bytes`, returning it and the bytes consumed
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(bytes)?;
        let total = header.frame_len();
        if bytes.len() < total {
            return Err(FrameError::Truncated {
                needed: total,
                available: bytes.len(),
            });
        }

        let payload = &bytes[HEADER_LEN..HEADER_LEN + header.payload_len];
        let mut trailer = &bytes[HEADER_LEN + header.payload_len..total];
        let stored_crc = read_u16(&mut trailer)?;
        let terminator = read_u16(&mut trailer)?;

        if terminator != TERMINATOR {
            return Err(FrameError::BadTerminator(terminator));
        }
        let computed = crc16(payload);
        if computed != stored_crc {
            return Err(FrameError::PayloadCrc {
                expected: stored_crc,
                actual: computed,
            });
        }

        let frame = Self {
            kind: header.kind,
            source: Endpoint::try_from(header.source)?,
            destination: Endpoint::try_from(header.destination)?,
            netstat: header.netstat,
            payload: payload.to_vec(),
        };
        Ok((frame, total))
    }
}

// Cursor helpers mapping short reads onto FrameError

fn truncated() -> FrameError {
    FrameError::Truncated {
        needed: HEADER_LEN,
        available: 0,
    }
}

fn read_u8(cursor: &mut &[u8]) -> Result<u8> {
    cursor.read_u8().map_err(|_| truncated())
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16> {
    cursor.read_u16::<LittleEndian>().map_err(|_| truncated())
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32> {
    cursor.read_u32::<LittleEndian>().map_err(|_| truncated())
}
