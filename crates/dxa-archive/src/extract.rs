//! Per-entry decode pipeline: decrypt, then Huffman, then LZ.

use tracing::debug;

use crate::crypto::Cipher;
use crate::decompress::{lz_decoded_size, LzDecoder};
use crate::entry::{split_middle, DxaEntry};
use crate::huffman;
use crate::{Error, Result};

/// Undo the Huffman layer of a stored blob.
///
/// `total` is the size of the Huffman input: the LZ stream size for
/// LZ-packed entries, the raw size otherwise. Above twice the cap only the
/// first and last `cap` bytes went through Huffman; the block then decodes
/// to those `2 * cap` bytes and the middle follows it verbatim.
pub(crate) fn unpack_huffman_layer(
    blob: &[u8],
    huffman_size: u64,
    total: u64,
    cap_kb: u8,
) -> Result<Vec<u8>> {
    let block_end = usize::try_from(huffman_size)
        .ok()
        .filter(|&end| end <= blob.len())
        .ok_or_else(|| {
            Error::CorruptStream(format!(
                "Huffman block of {huffman_size} bytes exceeds stored {} bytes",
                blob.len()
            ))
        })?;

    let block = &blob[..block_end];
    let middle = split_middle(total, cap_kb) as usize;
    let expected = total as usize - middle;

    let declared = huffman::decoded_size(block)
        .map_err(|e| Error::CorruptStream(format!("Huffman header: {e}")))?;
    if declared != expected as u64 {
        return Err(Error::SizeMismatch {
            supplied: declared,
            expected: expected as u64,
        });
    }

    let decoded = huffman::decode(block)?;
    if decoded.len() != expected {
        return Err(Error::SizeMismatch {
            supplied: decoded.len() as u64,
            expected: expected as u64,
        });
    }
    if middle == 0 {
        return Ok(decoded);
    }

    let edge = expected / 2;
    let verbatim = blob
        .get(block_end..block_end + middle)
        .ok_or_else(|| Error::CorruptStream("split Huffman middle span truncated".into()))?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&decoded[..edge]);
    out.extend_from_slice(verbatim);
    out.extend_from_slice(&decoded[edge..]);
    Ok(out)
}

/// Runs the decode layers of one entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntryExtractor<'a> {
    cipher: &'a dyn Cipher,
    lz: &'a dyn LzDecoder,
}

impl<'a> EntryExtractor<'a> {
    pub(crate) fn new(cipher: &'a dyn Cipher, lz: &'a dyn LzDecoder) -> Self {
        Self { cipher, lz }
    }

    /// Turn an entry's stored bytes into its contents.
    pub(crate) fn extract(&self, entry: &DxaEntry, stored: &[u8]) -> Result<Vec<u8>> {
        let kind = entry.kind();
        debug!(path = entry.path(), ?kind, encrypted = entry.is_encrypted(), "extracting entry");

        let mut data = stored.to_vec();
        if let Some(key) = entry.key() {
            self.cipher.apply(&mut data, entry.raw_size(), key);
        }

        if let Some(huffman_size) = kind.huffman_size() {
            let total = kind.lz_size().unwrap_or(entry.raw_size());
            data = unpack_huffman_layer(&data, huffman_size, total, entry.huffman_cap_kb())?;
        }

        if kind.lz_size().is_some() {
            let declared = lz_decoded_size(&data)?;
            if declared as u64 != entry.raw_size() {
                return Err(Error::SizeMismatch {
                    supplied: declared as u64,
                    expected: entry.raw_size(),
                });
            }
            data = self.lz.decompress(&data, entry.raw_size() as usize)?;
        }

        if data.len() as u64 != entry.raw_size() {
            return Err(Error::SizeMismatch {
                supplied: data.len() as u64,
                expected: entry.raw_size(),
            });
        }
        Ok(data)
    }
}
