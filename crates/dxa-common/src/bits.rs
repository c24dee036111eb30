//! MSB-first bit reader.
//!
//! DXA Huffman headers are packed most-significant-bit first within each
//! byte, and multi-bit fields are assembled big-endian (the first bit read
//! becomes the highest bit of the value).

use crate::{Error, Result};

/// Sequential bit extractor over a byte slice.
///
/// # Example
///
/// ```
/// use dxa_common::BitReader;
///
/// let mut bits = BitReader::new(&[0b1011_0000, 0xFF]);
/// assert_eq!(bits.read(3).unwrap(), 0b101);
/// assert_eq!(bits.read(1).unwrap(), 0b1);
/// assert_eq!(bits.bytes_consumed(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte: 0,
            bit: 0,
        }
    }

    /// Number of bits left in the stream.
    #[inline]
    pub fn bits_remaining(&self) -> usize {
        (self.data.len() - self.byte.min(self.data.len())) * 8 - self.bit as usize
    }

    /// Read `count` bits (0..=64) as an unsigned value.
    ///
    /// Fails without consuming anything when fewer than `count` bits remain.
    pub fn read(&mut self, count: u32) -> Result<u64> {
        if count > 64 {
            return Err(Error::BitCountTooLarge(count));
        }
        let available = self.bits_remaining();
        if available < count as usize {
            return Err(Error::BitsExhausted {
                needed: count as usize,
                available,
            });
        }

        let mut value = 0u64;
        for _ in 0..count {
            let bit = (self.data[self.byte] >> (7 - self.bit)) & 1;
            value = (value << 1) | u64::from(bit);

            self.bit += 1;
            if self.bit == 8 {
                self.bit = 0;
                self.byte += 1;
            }
        }
        Ok(value)
    }

    /// Read a single bit as a flag.
    #[inline]
    pub fn read_flag(&mut self) -> Result<bool> {
        self.read(1).map(|b| b == 1)
    }

    /// Whole bytes touched so far, counting a partially read byte as one.
    #[inline]
    pub fn bytes_consumed(&self) -> usize {
        self.byte + usize::from(self.bit != 0)
    }
}
