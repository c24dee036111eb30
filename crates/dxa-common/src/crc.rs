//! CRC-32 hashing utilities.
//!
//! DXA key derivation hashes password bytes with the standard IEEE CRC-32
//! (the zlib/PNG polynomial), not CRC-32C.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Compute the CRC-32 of every `step`-th byte starting at `start`.
///
/// `hash_strided(data, 1, 2)` hashes the odd-indexed bytes without
/// building an intermediate buffer.
pub fn hash_strided(data: &[u8], start: usize, step: usize) -> u32 {
    let mut digest = CRC32.digest();
    for byte in data.iter().skip(start).step_by(step.max(1)) {
        digest.update(std::slice::from_ref(byte));
    }
    digest.finalize()
}
