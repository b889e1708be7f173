//! CRC-16/CCITT-FALSE (polynomial 0x1021, init 0xFFFF, no reflection)

use ::crc::{Crc, CRC_16_IBM_3740};

const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC of a whole buffer
pub fn crc16(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}
