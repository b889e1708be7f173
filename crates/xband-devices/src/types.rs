//! Device settings and status records

use std::fmt;
use std::path::PathBuf;

/// Transmit hardware gain that mutes the TX chain
pub const TX_MUTE_DB: f64 = -85.0;

// ============================================================================
// Modes
// ============================================================================

/// ENSM operating mode of the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Sleep,
    Fdd,
    Tdd,
    Unknown,
}

impl OperatingMode {
    /// Decode the driver's mode string (`"sleep"`, `"fdd"`, `"tdd"`)
    pub fn from_hardware_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sleep" => Self::Sleep,
            "fdd" => Self::Fdd,
            "tdd" => Self::Tdd,
            _ => Self::Unknown,
        }
    }

    pub fn as_hardware_str(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Fdd => "fdd",
            Self::Tdd => "tdd",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_hardware_str())
    }
}

/// Receive gain control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    Manual,
    SlowAttack,
    FastAttack,
    Hybrid,
}

impl GainMode {
    /// Decode a gain-mode name; anything unrecognised falls back to slow attack
    pub fn from_hardware_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Self::Manual,
            "fast_attack" => Self::FastAttack,
            "hybrid" => Self::Hybrid,
            _ => Self::SlowAttack,
        }
    }

    pub fn as_hardware_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::SlowAttack => "slow_attack",
            Self::FastAttack => "fast_attack",
            Self::Hybrid => "hybrid",
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// One independent radio configuration step
#[derive(Debug, Clone, PartialEq)]
pub enum RadioSetting {
    Mode(OperatingMode),
    LoFrequency { hz: i64 },
    SampleRate { hz: i64 },
    Bandwidth { hz: i64 },
    GainMode(GainMode),
    /// Manual receive gain
    RxGain { db: f64 },
    TxGain { db: f64 },
    /// FIR filter profile file
    Filter(PathBuf),
}

impl RadioSetting {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mode(_) => "mode",
            Self::LoFrequency { .. } => "lo_frequency",
            Self::SampleRate { .. } => "sample_rate",
            Self::Bandwidth { .. } => "bandwidth",
            Self::GainMode(_) => "gain_mode",
            Self::RxGain { .. } => "rx_gain",
            Self::TxGain { .. } => "tx_gain",
            Self::Filter(_) => "filter",
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Transceiver readings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadioStatus {
    pub bandwidth_hz: i64,
    pub gain_db: f64,
    pub gain_mode: String,
    pub lo_hz: i64,
    pub rssi_db: f64,
    pub sample_rate_hz: i64,
    /// Millidegrees Celsius
    pub temperature_mc: i64,
    /// Raw ENSM mode string as reported by the driver
    pub ensm_mode: String,
}

impl RadioStatus {
    pub fn mode(&self) -> OperatingMode {
        OperatingMode::from_hardware_str(&self.ensm_mode)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemStatus {
    pub running: bool,
    pub bursts_received: u64,
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesizerStatus {
    pub powered: bool,
    pub rx_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_strings() {
        assert_eq!(OperatingMode::from_hardware_str("fdd"), OperatingMode::Fdd);
        assert_eq!(OperatingMode::from_hardware_str("TDD\n"), OperatingMode::Tdd);
        assert_eq!(OperatingMode::from_hardware_str("sleep"), OperatingMode::Sleep);
        assert_eq!(OperatingMode::from_hardware_str("alert"), OperatingMode::Unknown);
        assert_eq!(OperatingMode::from_hardware_str(""), OperatingMode::Unknown);
    }

    #[test]
    fn test_gain_mode_fallback() {
        assert_eq!(GainMode::from_hardware_str("fast_attack"), GainMode::FastAttack);
        assert_eq!(GainMode::from_hardware_str("manual"), GainMode::Manual);
        assert_eq!(GainMode::from_hardware_str("hybrid"), GainMode::Hybrid);
        assert_eq!(GainMode::from_hardware_str("slow_attack"), GainMode::SlowAttack);
        assert_eq!(GainMode::from_hardware_str("bogus"), GainMode::SlowAttack);
    }

    #[test]
    fn test_status_mode_decoded() {
        let status = RadioStatus {
            ensm_mode: "fdd".into(),
            ..Default::default()
        };
        assert_eq!(status.mode(), OperatingMode::Fdd);
        assert_eq!(RadioStatus::default().mode(), OperatingMode::Unknown);
    }
}
