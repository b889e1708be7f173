//! Simulated X-band backend for bench runs and testing
//!
//! Software stand-ins for the transceiver, receiver modem and PLL. Each
//! follows the same lifecycle rules as the hardware drivers (redundant
//! `init()` rejected, `receive()` blocks until a burst or `stop()`) and
//! exposes knobs to inject the failures seen in the field:
//!
//! | Knob | Effect |
//! |------|--------|
//! | `fail_next_inits(n)` | next `n` `init()` calls fail |
//! | `SimModem::fail_next_starts(n)` | next `n` `start()` calls fail |
//! | `SimModem::short_next_reads(n)` | next `n` `read()` calls return half the burst |
//! | `SimModem::inject_fault()` | next `receive()` reports an unrecoverable fault |
//! | `SimRadio::reject(setting)` | every `configure()` of that setting fails |

mod modem;
mod radio;
mod synthesizer;

pub use modem::SimModem;
pub use radio::SimRadio;
pub use synthesizer::SimSynthesizer;

/// Consume one injected failure, if any are pending
fn take_failure(pending: &mut u32) -> bool {
    if *pending > 0 {
        *pending -= 1;
        true
    } else {
        false
    }
}
