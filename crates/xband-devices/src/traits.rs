//! Device capability traits

use crate::error::DeviceResult;
use crate::types::{ModemStatus, RadioSetting, RadioStatus, SynthesizerStatus};

/// RF transceiver
pub trait RadioDevice: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Bring the transceiver up; rejected with `AlreadyReady` when it is up
    fn init(&self) -> DeviceResult<()>;

    /// Apply a single configuration step
    fn configure(&self, setting: &RadioSetting) -> DeviceResult<()>;

    fn read_status(&self) -> DeviceResult<RadioStatus>;
}

/// Receiver modem
///
/// `receive()` blocks until a burst is waiting and returns its length;
/// `Ok(0)` means the wait ended without data. `stop()` must wake a blocked
/// `receive()`, which then returns [`DeviceError::Stopped`](crate::DeviceError::Stopped).
pub trait ModemDevice: Send + Sync {
    fn is_ready(&self) -> bool;

    fn init(&self) -> DeviceResult<()>;

    /// Enable the receive path
    fn start(&self) -> DeviceResult<()>;

    /// Disable the receive path
    fn stop(&self) -> DeviceResult<()>;

    fn receive(&self) -> DeviceResult<usize>;

    /// Copy the pending burst into `buf`, returning the bytes copied
    fn read(&self, buf: &mut [u8]) -> DeviceResult<usize>;

    fn read_status(&self) -> DeviceResult<ModemStatus>;
}

/// PLL synthesizer
pub trait SynthesizerDevice: Send + Sync {
    fn is_ready(&self) -> bool;

    fn init(&self) -> DeviceResult<()>;

    /// Switch the synthesizer to receive mode
    fn start(&self) -> DeviceResult<()>;

    /// Power the synthesizer down
    fn stop(&self) -> DeviceResult<()>;

    fn read_status(&self) -> DeviceResult<SynthesizerStatus>;
}
