//! DXA v8 archive header.
//!
//! The header is a fixed 0x40-byte little-endian block at the start of the
//! file. Table offsets inside it are relative to the start of the index,
//! `index_offset` is absolute, and payload offsets stored in the index are
//! relative to `base_offset`.

use dxa_common::BinaryReader;
use tracing::debug;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, Result};

/// Raw on-disk header layout.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct RawHeader {
    /// "DX"
    pub magic: [u8; 2],
    /// Format version, 8 for this reader
    pub version: u16,
    /// Size of the decoded index in bytes
    pub index_size: u32,
    /// Start of entry payloads
    pub base_offset: i64,
    /// Absolute offset of the (possibly compressed) index
    pub index_offset: i64,
    /// File table offset within the index
    pub file_table_offset: i64,
    /// Directory table offset within the index
    pub dir_table_offset: i64,
    /// Code page used for entry names
    pub code_page: i32,
    /// Archive flags, see [`HeaderFlags`]
    pub flags: u32,
    /// Huffman cap in KB, 0xFF disables it
    pub huffman_kb: u8,
    /// Padding
    pub reserved: [u8; 15],
}

impl RawHeader {
    /// Signature bytes.
    pub const MAGIC: [u8; 2] = *b"DX";

    /// The only version this crate decodes.
    pub const VERSION: u16 = 8;

    /// Size of the header on disk.
    pub const SIZE: usize = 0x40;
}

/// Archive-level flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags {
    /// Nothing in the archive is encrypted.
    pub no_key: bool,
    /// The index is stored without the Huffman + LZ layers.
    pub no_head_compress: bool,
}

impl HeaderFlags {
    const NO_KEY: u32 = 0x1;
    const NO_HEAD_COMPRESS: u32 = 0x2;

    /// Decode the flag word, rejecting bits this reader does not know.
    pub fn from_bits(bits: u32) -> Result<Self> {
        let unknown = bits & !(Self::NO_KEY | Self::NO_HEAD_COMPRESS);
        if unknown != 0 {
            return Err(Error::UnsupportedFeature(format!(
                "header flags {unknown:#x}"
            )));
        }
        Ok(Self {
            no_key: bits & Self::NO_KEY != 0,
            no_head_compress: bits & Self::NO_HEAD_COMPRESS != 0,
        })
    }

    /// Encode back to the on-disk flag word.
    pub fn bits(self) -> u32 {
        let mut bits = 0;
        if self.no_key {
            bits |= Self::NO_KEY;
        }
        if self.no_head_compress {
            bits |= Self::NO_HEAD_COMPRESS;
        }
        bits
    }

    /// Whether the index and entries are encrypted.
    #[inline]
    pub fn is_encrypted(self) -> bool {
        !self.no_key
    }
}

/// Parsed and validated archive header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DxaHeader {
    /// Size of the decoded index in bytes.
    pub index_size: u32,
    /// Start of entry payloads.
    pub base_offset: i64,
    /// Absolute offset of the index.
    pub index_offset: i64,
    /// File table offset within the index.
    pub file_table_offset: i64,
    /// Directory table offset within the index.
    pub dir_table_offset: i64,
    /// Code page of entry names.
    pub code_page: i32,
    /// Archive flags.
    pub flags: HeaderFlags,
    /// Huffman cap in KB (0xFF = uncapped).
    pub huffman_cap_kb: u8,
}

impl DxaHeader {
    /// Parse the header from the start of an archive.
    ///
    /// Offset sanity is checked here, before anything is decrypted or
    /// decompressed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RawHeader::SIZE {
            return Err(Error::Format(format!(
                "file is {} bytes, smaller than the {:#x}-byte header",
                data.len(),
                RawHeader::SIZE
            )));
        }

        BinaryReader::new(data)
            .expect_magic(&RawHeader::MAGIC)
            .map_err(|e| Error::Format(format!("bad signature: {e}")))?;
        let raw: RawHeader = BinaryReader::new(data).read_struct()?;
        let version = raw.version;
        if version != RawHeader::VERSION {
            return Err(Error::Format(format!("unsupported version {version}")));
        }

        let header = Self {
            index_size: raw.index_size,
            base_offset: raw.base_offset,
            index_offset: raw.index_offset,
            file_table_offset: raw.file_table_offset,
            dir_table_offset: raw.dir_table_offset,
            code_page: raw.code_page,
            flags: HeaderFlags::from_bits(raw.flags)?,
            huffman_cap_kb: raw.huffman_kb,
        };
        header.validate()?;

        debug!(
            index_size = header.index_size,
            index_offset = header.index_offset,
            base_offset = header.base_offset,
            code_page = header.code_page,
            encrypted = header.flags.is_encrypted(),
            compressed_index = !header.flags.no_head_compress,
            huffman_cap_kb = header.huffman_cap_kb,
            "parsed DXA v8 header"
        );

        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        let index_size = i64::from(self.index_size);
        if self.dir_table_offset >= index_size || self.file_table_offset >= index_size {
            return Err(Error::Format(format!(
                "table offsets (dir {:#x}, file {:#x}) outside index of {:#x} bytes",
                self.dir_table_offset, self.file_table_offset, self.index_size
            )));
        }
        if self.dir_table_offset < 0 || self.file_table_offset < 0 {
            return Err(Error::Format("negative table offset".into()));
        }
        if self.base_offset < 0 || self.index_offset < 0 {
            return Err(Error::Format("negative base or index offset".into()));
        }
        Ok(())
    }

    /// Huffman cap in bytes, `None` when disabled.
    #[inline]
    pub fn huffman_cap(&self) -> Option<u64> {
        huffman_cap_bytes(self.huffman_cap_kb)
    }
}

/// Convert a cap in KB to bytes; 0xFF means no cap.
#[inline]
pub(crate) fn huffman_cap_bytes(cap_kb: u8) -> Option<u64> {
    (cap_kb != 0xFF).then(|| u64::from(cap_kb) * 1024)
}
