//! CRC-8 used as the per-record corruption detector.
//!
//! Polynomial x^8 + x^2 + x + 1 (0x07), initial value 0, processed
//! MSB-first with no reflection and no final XOR (CRC-8/SMBUS). Detection
//! only: a mismatch hides the record, nothing is ever repaired.

use crc::{Crc, CRC_8_SMBUS};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// CRC-8 over `data`.
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
