//! X-band Device Interfaces
//!
//! Thin capability traits over the three pieces of X-band hardware a
//! Haystack node drives:
//!
//! - [`RadioDevice`]: the RF transceiver (LO, sample rate, bandwidth,
//!   gains, ENSM operating mode, FIR filter profile)
//! - [`ModemDevice`]: the receiver modem that turns the downlink into bursts
//! - [`SynthesizerDevice`]: the PLL feeding the radio's local oscillator
//!
//! Drivers are shared between threads behind `Arc<dyn ...>`, so every
//! operation takes `&self` and the implementation owns its locking.
//!
//! Calling `init()` on a device that is already ready fails with
//! [`DeviceError::AlreadyReady`] and leaves the hardware untouched.
//!
//! The [`sim`] module provides software devices with failure injection for
//! bench runs and tests.

pub mod error;
pub mod sim;
pub mod traits;
pub mod types;

pub use error::{DeviceError, DeviceResult};
pub use traits::{ModemDevice, RadioDevice, SynthesizerDevice};
pub use types::{
    GainMode, ModemStatus, OperatingMode, RadioSetting, RadioStatus, SynthesizerStatus,
    TX_MUTE_DB,
};
