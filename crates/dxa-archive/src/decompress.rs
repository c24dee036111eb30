//! DxLib LZ decompression.
//!
//! Stream layout: `u32 dest_size`, `u32 src_size` (including this 9-byte
//! header), `u8 keycode`, then a byte stream where any byte other than the
//! keycode is a literal. A keycode starts an escape:
//!
//! - `keycode keycode` emits the keycode itself.
//! - `keycode code [ext] dist..` is a back-reference. Codes above the
//!   keycode are stored plus one. Length is `(code >> 3) + 4`, extended by
//!   `ext << 5` when bit 2 is set. Bits 0..2 give the distance width (1 to 3
//!   little-endian bytes); the stored distance is one less than the real one.

use std::fmt;

use dxa_common::BinaryReader;

use crate::{Error, Result};

const LZ_HEADER_SIZE: usize = 9;
const MIN_MATCH: usize = 4;

/// Generic decompressor with the output size known up front.
pub trait LzDecoder: Send + Sync + fmt::Debug {
    /// Decompress `data` into exactly `expected_size` bytes.
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>>;
}

/// The DxLib LZ codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct DxLz;

impl LzDecoder for DxLz {
    fn decompress(&self, data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
        decompress_lz(data, expected_size)
    }
}

fn truncated() -> Error {
    Error::CorruptStream("LZ stream ends inside an escape sequence".into())
}

/// Read the declared output size of an LZ stream.
pub(crate) fn lz_decoded_size(data: &[u8]) -> Result<usize> {
    let mut reader = BinaryReader::new(data);
    reader
        .read_u32()
        .map(|size| size as usize)
        .map_err(|_| Error::CorruptStream("LZ header truncated".into()))
}

/// Decompress a DxLib LZ stream.
pub fn decompress_lz(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    if data.len() < LZ_HEADER_SIZE {
        return Err(Error::CorruptStream("LZ header truncated".into()));
    }
    let mut reader = BinaryReader::new(data);
    let dest_size = reader.read_u32()? as usize;
    let src_size = reader.read_u32()? as usize;
    let keycode = reader.read_u8()?;

    if dest_size != expected_size {
        return Err(Error::SizeMismatch {
            supplied: dest_size as u64,
            expected: expected_size as u64,
        });
    }
    if src_size < LZ_HEADER_SIZE || src_size > data.len() {
        return Err(Error::CorruptStream(format!(
            "LZ source size {src_size} outside buffer of {} bytes",
            data.len()
        )));
    }

    let src = &data[LZ_HEADER_SIZE..src_size];
    let byte_at = |pos: usize| src.get(pos).copied().ok_or_else(truncated);

    let mut out = Vec::with_capacity(dest_size);
    let mut pos = 0;
    while pos < src.len() {
        let byte = src[pos];
        if byte != keycode {
            out.push(byte);
            pos += 1;
            continue;
        }

        let mut code = byte_at(pos + 1)?;
        if code == keycode {
            out.push(keycode);
            pos += 2;
            continue;
        }
        if code > keycode {
            code -= 1;
        }
        pos += 2;

        let mut length = usize::from(code >> 3);
        if code & 0x4 != 0 {
            length |= usize::from(byte_at(pos)?) << 5;
            pos += 1;
        }
        length += MIN_MATCH;

        let distance = match code & 0x3 {
            0 => usize::from(byte_at(pos)?),
            1 => usize::from(byte_at(pos)?) | usize::from(byte_at(pos + 1)?) << 8,
            2 => {
                usize::from(byte_at(pos)?)
                    | usize::from(byte_at(pos + 1)?) << 8
                    | usize::from(byte_at(pos + 2)?) << 16
            }
            _ => {
                return Err(Error::CorruptStream(format!(
                    "invalid LZ distance width in code {code:#04x}"
                )))
            }
        };
        pos += usize::from(code & 0x3) + 1;
        let distance = distance + 1;

        if distance > out.len() {
            return Err(Error::CorruptStream(format!(
                "LZ back-reference {distance} before start of output ({} bytes)",
                out.len()
            )));
        }
        if out.len() + length > dest_size {
            return Err(Error::CorruptStream("LZ match overruns output".into()));
        }

        // Byte-wise so overlapping matches repeat the window.
        let start = out.len() - distance;
        for i in 0..length {
            out.push(out[start + i]);
        }
    }

    if out.len() != dest_size {
        return Err(Error::CorruptStream(format!(
            "LZ stream produced {} bytes, header declares {dest_size}",
            out.len()
        )));
    }
    Ok(out)
}
