//! Device error types

use thiserror::Error;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

// errno values reported in status frames when the driver gives no code
const EIO: i64 = 5;
const ENODEV: i64 = 19;
const ECANCELED: i64 = 125;
const EALREADY: i64 = 114;

/// Errors reported by X-band device drivers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// `init()` on a device that is already initialized
    #[error("{0} is already ready")]
    AlreadyReady(&'static str),

    /// Operation requires a prior successful `init()`
    #[error("{0} is not ready")]
    NotReady(&'static str),

    #[error("{device} init failed (code {code})")]
    InitFailed { device: &'static str, code: i32 },

    #[error("{device} start failed (code {code})")]
    StartFailed { device: &'static str, code: i32 },

    #[error("{device} stop failed (code {code})")]
    StopFailed { device: &'static str, code: i32 },

    /// The radio refused one configuration step
    #[error("radio rejected {setting} (code {code})")]
    ConfigureRejected { setting: &'static str, code: i32 },

    #[error("modem receive failed (code {code})")]
    Receive { code: i64 },

    #[error("modem read failed (code {code})")]
    Read { code: i64 },

    /// A blocking call was interrupted because the modem was stopped
    #[error("modem stopped while blocked")]
    Stopped,

    /// The driver cannot continue; the process must shut down
    #[error("{device} unrecoverable: {reason}")]
    Unrecoverable { device: &'static str, reason: String },
}

impl DeviceError {
    /// Signed status code as carried in the status payload
    pub fn code(&self) -> i64 {
        match self {
            Self::AlreadyReady(_) => -EALREADY,
            Self::NotReady(_) => -ENODEV,
            Self::InitFailed { code, .. }
            | Self::StartFailed { code, .. }
            | Self::StopFailed { code, .. }
            | Self::ConfigureRejected { code, .. } => i64::from(*code),
            Self::Receive { code } | Self::Read { code } => *code,
            Self::Stopped => -ECANCELED,
            Self::Unrecoverable { .. } => -EIO,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative() {
        let errors = [
            DeviceError::AlreadyReady("modem"),
            DeviceError::NotReady("radio"),
            DeviceError::InitFailed { device: "modem", code: -110 },
            DeviceError::Receive { code: -22 },
            DeviceError::Stopped,
            DeviceError::Unrecoverable { device: "modem", reason: "dma".into() },
        ];
        for err in errors {
            assert!(err.code() < 0, "{err} reported code {}", err.code());
        }
    }

    #[test]
    fn test_only_unrecoverable_is_fatal() {
        assert!(DeviceError::Unrecoverable { device: "radio", reason: "spi".into() }.is_fatal());
        assert!(!DeviceError::Stopped.is_fatal());
        assert!(!DeviceError::Read { code: -5 }.is_fatal());
    }
}
