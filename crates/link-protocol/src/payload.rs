//! Payload schemas and the tagged `Message` view of a frame
//!
//! | Frame type | Payload | Size |
//! |------------|---------|------|
//! | `XbandConfig` | mode, LO, sample rate, bandwidth, filter name, gain mode | 108 |
//! | `XbandSet` | LO, bandwidth, sample rate, gains, filter selector, 16 phases | 45 |
//! | `XbandCommand` | command code (i32) | 4 |
//! | `XbandStatus` | radio readings + readiness flags + last result codes | 96 |
//! | `Data` | raw downlink burst | any |

use crate::frame::{Endpoint, Frame, FrameType};
use crate::{FrameError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

const FILTER_NAME_LEN: usize = 64;
const GAIN_MODE_LEN: usize = 16;
const PHASE_COUNT: usize = 16;

// ============================================================================
// Radio Mode (wire form)
// ============================================================================

/// ENSM operating mode as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioMode {
    Sleep,
    Fdd,
    Tdd,
    Unknown,
}

impl RadioMode {
    pub fn code(&self) -> i32 {
        match self {
            Self::Sleep => 0,
            Self::Fdd => 1,
            Self::Tdd => 2,
            Self::Unknown => -1,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Sleep,
            1 => Self::Fdd,
            2 => Self::Tdd,
            _ => Self::Unknown,
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Radio configuration record sent by the GUI client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XbandConfig {
    pub mode: RadioMode,
    pub lo_hz: i64,
    pub sample_rate_hz: i64,
    pub bandwidth_hz: i64,
    /// Filter profile name, empty for none
    pub filter_name: String,
    pub gain_mode: String,
}

impl XbandConfig {
    pub const WIRE_LEN: usize = 4 + 8 + 8 + 8 + FILTER_NAME_LEN + GAIN_MODE_LEN;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_LEN);
        out.extend_from_slice(&self.mode.code().to_le_bytes());
        out.extend_from_slice(&self.lo_hz.to_le_bytes());
        out.extend_from_slice(&self.sample_rate_hz.to_le_bytes());
        out.extend_from_slice(&self.bandwidth_hz.to_le_bytes());
        put_str(&mut out, &self.filter_name, FILTER_NAME_LEN);
        put_str(&mut out, &self.gain_mode, GAIN_MODE_LEN);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(FrameType::XbandConfig, bytes, Self::WIRE_LEN)?;
        Ok(Self {
            mode: RadioMode::from_code(r.i32()),
            lo_hz: r.i64(),
            sample_rate_hz: r.i64(),
            bandwidth_hz: r.i64(),
            filter_name: r.str(FILTER_NAME_LEN),
            gain_mode: r.str(GAIN_MODE_LEN),
        })
    }
}

/// Packed set-RX record used by the phased-array deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XbandSet {
    pub lo_mhz: f32,
    pub bandwidth_mhz: f32,
    pub sample_rate_ksps: u16,
    pub phy_gain: u8,
    pub adar_gain: u8,
    pub filter: u8,
    pub phase: [i16; PHASE_COUNT],
}

impl XbandSet {
    pub const WIRE_LEN: usize = 4 + 4 + 2 + 1 + 1 + 1 + 2 * PHASE_COUNT;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_LEN);
        out.extend_from_slice(&self.lo_mhz.to_le_bytes());
        out.extend_from_slice(&self.bandwidth_mhz.to_le_bytes());
        out.extend_from_slice(&self.sample_rate_ksps.to_le_bytes());
        out.push(self.phy_gain);
        out.push(self.adar_gain);
        out.push(self.filter);
        for p in self.phase {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(FrameType::XbandSet, bytes, Self::WIRE_LEN)?;
        let lo_mhz = r.f32();
        let bandwidth_mhz = r.f32();
        let sample_rate_ksps = r.u16();
        let phy_gain = r.u8();
        let adar_gain = r.u8();
        let filter = r.u8();
        let mut phase = [0i16; PHASE_COUNT];
        for p in phase.iter_mut() {
            *p = r.i16();
        }
        Ok(Self {
            lo_mhz,
            bandwidth_mhz,
            sample_rate_ksps,
            phy_gain,
            adar_gain,
            filter,
            phase,
        })
    }
}

/// Remote X-band command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XbandCommand {
    InitPll,
    DisablePll,
    ArmRx,
    DisarmRx,
}

impl XbandCommand {
    pub const WIRE_LEN: usize = 4;

    pub fn code(&self) -> i32 {
        match self {
            Self::InitPll => 0,
            Self::DisablePll => 1,
            Self::ArmRx => 2,
            Self::DisarmRx => 3,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.code().to_le_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(FrameType::XbandCommand, bytes, Self::WIRE_LEN)?;
        match r.i32() {
            0 => Ok(Self::InitPll),
            1 => Ok(Self::DisablePll),
            2 => Ok(Self::ArmRx),
            3 => Ok(Self::DisarmRx),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

/// Periodic status report sent to the GUI client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XbandStatus {
    pub mode: RadioMode,
    pub lo_hz: i64,
    pub sample_rate_hz: i64,
    pub bandwidth_hz: i64,
    /// Millidegrees Celsius
    pub temperature_mc: i64,
    pub rssi_db: f64,
    pub gain_db: f64,
    pub gain_mode: String,
    pub modem_ready: bool,
    pub pll_ready: bool,
    pub radio_ready: bool,
    pub rx_armed: bool,
    pub last_receive_result: i64,
    pub last_read_result: i64,
    pub timestamp_unix: i64,
}

impl XbandStatus {
    pub const WIRE_LEN: usize = 4 + 8 * 4 + 8 * 2 + GAIN_MODE_LEN + 4 + 8 * 3;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::WIRE_LEN);
        out.extend_from_slice(&self.mode.code().to_le_bytes());
        out.extend_from_slice(&self.lo_hz.to_le_bytes());
        out.extend_from_slice(&self.sample_rate_hz.to_le_bytes());
        out.extend_from_slice(&self.bandwidth_hz.to_le_bytes());
        out.extend_from_slice(&self.temperature_mc.to_le_bytes());
        out.extend_from_slice(&self.rssi_db.to_le_bytes());
        out.extend_from_slice(&self.gain_db.to_le_bytes());
        put_str(&mut out, &self.gain_mode, GAIN_MODE_LEN);
        out.push(self.modem_ready as u8);
        out.push(self.pll_ready as u8);
        out.push(self.radio_ready as u8);
        out.push(self.rx_armed as u8);
        out.extend_from_slice(&self.last_receive_result.to_le_bytes());
        out.extend_from_slice(&self.last_read_result.to_le_bytes());
        out.extend_from_slice(&self.timestamp_unix.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(FrameType::XbandStatus, bytes, Self::WIRE_LEN)?;
        Ok(Self {
            mode: RadioMode::from_code(r.i32()),
            lo_hz: r.i64(),
            sample_rate_hz: r.i64(),
            bandwidth_hz: r.i64(),
            temperature_mc: r.i64(),
            rssi_db: r.f64(),
            gain_db: r.f64(),
            gain_mode: r.str(GAIN_MODE_LEN),
            modem_ready: r.u8() != 0,
            pll_ready: r.u8() != 0,
            radio_ready: r.u8() != 0,
            rx_armed: r.u8() != 0,
            last_receive_result: r.i64(),
            last_read_result: r.i64(),
            timestamp_unix: r.i64(),
        })
    }
}

// ============================================================================
// Message
// ============================================================================

/// Typed view of a frame's payload, selected by the frame type
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Null,
    /// Keep-alive; the server may attach a status cadence in seconds
    Poll(Option<u32>),
    Ack,
    Nack,
    Data(Vec<u8>),
    XbandConfig(XbandConfig),
    XbandSet(XbandSet),
    XbandCommand(XbandCommand),
    XbandStatus(XbandStatus),
    Error(Vec<u8>),
    /// UHF configuration or an unknown type; not interpreted by X-band nodes
    Other { kind: FrameType, payload: Vec<u8> },
}

impl Message {
    pub fn kind(&self) -> FrameType {
        match self {
            Self::Null => FrameType::Null,
            Self::Poll(_) => FrameType::Poll,
            Self::Ack => FrameType::Ack,
            Self::Nack => FrameType::Nack,
            Self::Data(_) => FrameType::Data,
            Self::XbandConfig(_) => FrameType::XbandConfig,
            Self::XbandSet(_) => FrameType::XbandSet,
            Self::XbandCommand(_) => FrameType::XbandCommand,
            Self::XbandStatus(_) => FrameType::XbandStatus,
            Self::Error(_) => FrameType::Error,
            Self::Other { kind, .. } => *kind,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::Null | Self::Poll(None) | Self::Ack | Self::Nack => Vec::new(),
            Self::Poll(Some(secs)) => secs.to_le_bytes().to_vec(),
            Self::Data(bytes) | Self::Error(bytes) => bytes.clone(),
            Self::XbandConfig(cfg) => cfg.encode(),
            Self::XbandSet(set) => set.encode(),
            Self::XbandCommand(cmd) => cmd.encode(),
            Self::XbandStatus(status) => status.encode(),
            Self::Other { payload, .. } => payload.clone(),
        }
    }

    /// Wrap into a routed frame
    pub fn into_frame(self, source: Endpoint, destination: Endpoint) -> Result<Frame> {
        let kind = self.kind();
        let payload = match self {
            Self::Data(bytes) | Self::Error(bytes) => bytes,
            Self::Other { payload, .. } => payload,
            other => other.encode_payload(),
        };
        Frame::new(kind, source, destination, payload)
    }
}

impl Frame {
    /// Decode the payload according to the frame type
    pub fn message(&self) -> Result<Message> {
        let payload = self.payload();
        Ok(match self.kind {
            FrameType::Null => Message::Null,
            FrameType::Poll => Message::Poll(poll_interval(payload)),
            FrameType::Ack => Message::Ack,
            FrameType::Nack => Message::Nack,
            FrameType::Data => Message::Data(payload.to_vec()),
            FrameType::XbandConfig => Message::XbandConfig(XbandConfig::decode(payload)?),
            FrameType::XbandSet => Message::XbandSet(XbandSet::decode(payload)?),
            FrameType::XbandCommand => Message::XbandCommand(XbandCommand::decode(payload)?),
            FrameType::XbandStatus => Message::XbandStatus(XbandStatus::decode(payload)?),
            FrameType::Error => Message::Error(payload.to_vec()),
            kind @ (FrameType::UhfConfig | FrameType::Unknown(_)) => Message::Other {
                kind,
                payload: payload.to_vec(),
            },
        })
    }
}

// ============================================================================
// Field helpers
// ============================================================================

/// Cadence carried by a Poll frame; shorter payloads carry none
fn poll_interval(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// NUL-padded fixed-width string; always leaves room for one NUL
fn put_str(out: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(width - 1);
    out.extend_from_slice(&bytes[..len]);
    out.resize(out.len() + (width - len), 0);
}

/// Length-checked reader; the constructor guarantees every read succeeds
struct PayloadReader<'a> {
    cursor: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn new(kind: FrameType, bytes: &'a [u8], needed: usize) -> Result<Self> {
        if bytes.len() < needed {
            return Err(FrameError::PayloadTooShort {
                kind,
                needed,
                available: bytes.len(),
            });
        }
        Ok(Self {
            cursor: &bytes[..needed],
        })
    }

    fn u8(&mut self) -> u8 {
        self.cursor.read_u8().unwrap_or_default()
    }

    fn u16(&mut self) -> u16 {
        self.cursor.read_u16::<LittleEndian>().unwrap_or_default()
    }

    fn i16(&mut self) -> i16 {
        self.cursor.read_i16::<LittleEndian>().unwrap_or_default()
    }

    fn i32(&mut self) -> i32 {
        self.cursor.read_i32::<LittleEndian>().unwrap_or_default()
    }

    fn i64(&mut self) -> i64 {
        self.cursor.read_i64::<LittleEndian>().unwrap_or_default()
    }

    fn f32(&mut self) -> f32 {
        self.cursor.read_f32::<LittleEndian>().unwrap_or_default()
    }

    fn f64(&mut self) -> f64 {
        self.cursor.read_f64::<LittleEndian>().unwrap_or_default()
    }

    fn str(&mut self, width: usize) -> String {
        let (field, rest) = self.cursor.split_at(width.min(self.cursor.len()));
        self.cursor = rest;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> XbandStatus {
        XbandStatus {
            mode: RadioMode::Fdd,
            lo_hz: 8_400_000_000,
            sample_rate_hz: 10_000_000,
            bandwidth_hz: 5_000_000,
            temperature_mc: 41_250,
            rssi_db: -72.25,
            gain_db: 31.5,
            gain_mode: "slow_attack".into(),
            modem_ready: true,
            pll_ready: false,
            radio_ready: true,
            rx_armed: true,
            last_receive_result: 4096,
            last_read_result: -5,
            timestamp_unix: 1_760_000_000,
        }
    }

    #[test]
    fn test_wire_lengths() {
        assert_eq!(XbandConfig::WIRE_LEN, 108);
        assert_eq!(XbandSet::WIRE_LEN, 45);
        assert_eq!(XbandStatus::WIRE_LEN, 96);
        assert_eq!(status().encode().len(), XbandStatus::WIRE_LEN);
    }

    #[test]
    fn test_status_through_frame() {
        let frame = Message::XbandStatus(status())
            .into_frame(Endpoint::Haystack, Endpoint::Client)
            .unwrap();
        let (decoded, _) = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.message(), Ok(Message::XbandStatus(status())));
    }

    #[test]
    fn test_config_strings_truncated_with_nul() {
        let cfg = XbandConfig {
            mode: RadioMode::Sleep,
            lo_hz: 1,
            sample_rate_hz: 2,
            bandwidth_hz: 3,
            filter_name: "f".repeat(100),
            gain_mode: "fast_attack".into(),
        };
        let decoded = XbandConfig::decode(&cfg.encode()).unwrap();
        assert_eq!(decoded.filter_name.len(), FILTER_NAME_LEN - 1);
        assert_eq!(decoded.gain_mode, "fast_attack");
        assert_eq!(decoded.mode, RadioMode::Sleep);
    }

    #[test]
    fn test_short_config_rejected() {
        let err = XbandConfig::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooShort {
                kind: FrameType::XbandConfig,
                needed: XbandConfig::WIRE_LEN,
                available: 10,
            }
        );
    }

    #[test]
    fn test_command_codes() {
        for cmd in [
            XbandCommand::InitPll,
            XbandCommand::DisablePll,
            XbandCommand::ArmRx,
            XbandCommand::DisarmRx,
        ] {
            assert_eq!(XbandCommand::decode(&cmd.encode()), Ok(cmd));
        }
        assert_eq!(
            XbandCommand::decode(&9i32.to_le_bytes()),
            Err(FrameError::UnknownCommand(9))
        );
    }

    #[test]
    fn test_two_config_shapes_selected_by_type() {
        let set = XbandSet {
            lo_mhz: 8400.0,
            bandwidth_mhz: 20.0,
            sample_rate_ksps: 10_000,
            phy_gain: 30,
            adar_gain: 12,
            filter: 2,
            phase: [-3; 16],
        };
        let frame = Message::XbandSet(set.clone())
            .into_frame(Endpoint::Client, Endpoint::Haystack)
            .unwrap();
        assert_eq!(frame.kind, FrameType::XbandSet);
        assert_eq!(frame.message(), Ok(Message::XbandSet(set)));
    }

    #[test]
    fn test_poll_cadence_optional() {
        let bare = Message::Poll(None)
            .into_frame(Endpoint::Server, Endpoint::Haystack)
            .unwrap();
        assert!(bare.payload().is_empty());
        assert_eq!(bare.message(), Ok(Message::Poll(None)));

        let timed = Message::Poll(Some(30))
            .into_frame(Endpoint::Server, Endpoint::Haystack)
            .unwrap();
        assert_eq!(timed.payload(), &30u32.to_le_bytes());
        assert_eq!(timed.message(), Ok(Message::Poll(Some(30))));

        let short = Frame::new(FrameType::Poll, Endpoint::Server, Endpoint::Haystack, vec![7, 0]).unwrap();
        assert_eq!(short.message(), Ok(Message::Poll(None)));
    }

    #[test]
    fn test_unknown_type_is_other() {
        let frame = Frame::new(
            FrameType::Unknown(0x33),
            Endpoint::Server,
            Endpoint::Haystack,
            vec![1, 2, 3],
        )
        .unwrap();
        assert_eq!(
            frame.message(),
            Ok(Message::Other {
                kind: FrameType::Unknown(0x33),
                payload: vec![1, 2, 3]
            })
        );
    }
}
