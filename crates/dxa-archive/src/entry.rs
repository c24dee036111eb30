//! DXA archive entry.

use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::crypto::DxaKey;
use crate::header::huffman_cap_bytes;

/// How an entry's payload is packed.
///
/// When both layers are present the Huffman layer is outermost: it decodes
/// to the LZ stream, which decodes to the raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum EntryKind {
    /// Stored as-is.
    Plain,
    /// LZ only.
    Lz { packed_size: u64 },
    /// Huffman only.
    Huffman { packed_size: u64 },
    /// Huffman over LZ.
    LzHuffman { lz_size: u64, huffman_size: u64 },
}

impl EntryKind {
    /// Pick the variant from the optional packed sizes of an index record.
    pub fn from_sizes(lz_size: Option<u64>, huffman_size: Option<u64>) -> Self {
        match (lz_size, huffman_size) {
            (None, None) => Self::Plain,
            (Some(packed_size), None) => Self::Lz { packed_size },
            (None, Some(packed_size)) => Self::Huffman { packed_size },
            (Some(lz_size), Some(huffman_size)) => Self::LzHuffman {
                lz_size,
                huffman_size,
            },
        }
    }

    /// Size of the LZ stream, if LZ-packed.
    #[inline]
    pub fn lz_size(&self) -> Option<u64> {
        match *self {
            Self::Lz { packed_size } => Some(packed_size),
            Self::LzHuffman { lz_size, .. } => Some(lz_size),
            _ => None,
        }
    }

    /// Size of the Huffman block, if Huffman-packed.
    #[inline]
    pub fn huffman_size(&self) -> Option<u64> {
        match *self {
            Self::Huffman { packed_size } => Some(packed_size),
            Self::LzHuffman { huffman_size, .. } => Some(huffman_size),
            _ => None,
        }
    }
}

/// An entry (file) within a DXA archive.
///
/// Metadata only; use [`DxaArchive::read`](crate::DxaArchive::read) to get
/// the contents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DxaEntry {
    /// Full path inside the archive, `\`-separated.
    path: String,
    /// Absolute offset of the stored payload.
    offset: u64,
    /// Size after all layers are removed.
    raw_size: u64,
    /// Bytes occupied in the archive.
    on_disk_size: u64,
    /// Packing layers.
    kind: EntryKind,
    /// Huffman cap inherited from the header.
    huffman_cap_kb: u8,
    #[cfg_attr(feature = "serde", serde(skip))]
    key: Option<DxaKey>,
}

impl DxaEntry {
    pub(crate) fn new(
        path: String,
        offset: u64,
        raw_size: u64,
        kind: EntryKind,
        huffman_cap_kb: u8,
        key: Option<DxaKey>,
    ) -> Self {
        let on_disk_size = stored_size(raw_size, kind, huffman_cap_kb);
        Self {
            path,
            offset,
            raw_size,
            on_disk_size,
            kind,
            huffman_cap_kb,
            key,
        }
    }

    /// Get the path within the archive.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the file name without directories.
    pub fn name(&self) -> &str {
        self.path.rsplit('\\').next().unwrap_or(&self.path)
    }

    /// Absolute offset of the payload in the archive.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Unpacked size in bytes.
    #[inline]
    pub fn raw_size(&self) -> u64 {
        self.raw_size
    }

    /// Stored size in bytes.
    #[inline]
    pub fn on_disk_size(&self) -> u64 {
        self.on_disk_size
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    #[inline]
    pub fn is_lz_packed(&self) -> bool {
        self.kind.lz_size().is_some()
    }

    #[inline]
    pub fn is_huffman_packed(&self) -> bool {
        self.kind.huffman_size().is_some()
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    #[inline]
    pub fn huffman_cap_kb(&self) -> u8 {
        self.huffman_cap_kb
    }

    #[inline]
    pub(crate) fn key(&self) -> Option<&DxaKey> {
        self.key.as_ref()
    }

    /// Get the relative output path for extraction.
    pub fn output_path(&self) -> PathBuf {
        self.path.split('\\').collect()
    }

    /// Get the file extension (lowercase).
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        name.rfind('.')
            .filter(|&i| i > 0)
            .map(|i| name[i + 1..].to_lowercase())
    }
}

/// Bytes an entry occupies on disk.
///
/// A split Huffman block covers only the head and tail of its input; the
/// middle follows the block verbatim and is counted here.
pub(crate) fn stored_size(raw_size: u64, kind: EntryKind, huffman_cap_kb: u8) -> u64 {
    match kind.huffman_size() {
        Some(huffman_size) => {
            let total = kind.lz_size().unwrap_or(raw_size);
            huffman_size + split_middle(total, huffman_cap_kb)
        }
        None => kind.lz_size().unwrap_or(raw_size),
    }
}

/// Length of the verbatim middle span of a Huffman input of `total` bytes.
pub(crate) fn split_middle(total: u64, huffman_cap_kb: u8) -> u64 {
    match huffman_cap_bytes(huffman_cap_kb) {
        Some(cap) if total > cap * 2 => total - cap * 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: EntryKind, cap: u8) -> DxaEntry {
        DxaEntry::new(path.into(), 0x40, 10240, kind, cap, None)
    }

    #[test]
    fn test_kind_from_sizes() {
        assert_eq!(EntryKind::from_sizes(None, None), EntryKind::Plain);
        assert_eq!(
            EntryKind::from_sizes(Some(10), None),
            EntryKind::Lz { packed_size: 10 }
        );
        assert_eq!(
            EntryKind::from_sizes(None, Some(7)),
            EntryKind::Huffman { packed_size: 7 }
        );
        let both = EntryKind::from_sizes(Some(10), Some(7));
        assert_eq!(both.lz_size(), Some(10));
        assert_eq!(both.huffman_size(), Some(7));
    }

    #[test]
    fn test_on_disk_size() {
        assert_eq!(entry("a", EntryKind::Plain, 4).on_disk_size(), 10240);
        assert_eq!(
            entry("a", EntryKind::Lz { packed_size: 500 }, 4).on_disk_size(),
            500
        );
        // 10240 raw with a 4 KB cap leaves 2048 bytes in the middle
        assert_eq!(
            entry("a", EntryKind::Huffman { packed_size: 3000 }, 4).on_disk_size(),
            5048
        );
        assert_eq!(
            entry("a", EntryKind::Huffman { packed_size: 3000 }, 0xFF).on_disk_size(),
            3000
        );
        // The split applies to the LZ stream, not the raw size
        let kind = EntryKind::LzHuffman {
            lz_size: 9000,
            huffman_size: 3000,
        };
        assert_eq!(entry("a", kind, 4).on_disk_size(), 3000 + 9000 - 8192);
    }

    #[test]
    fn test_split_threshold() {
        assert_eq!(split_middle(8192, 4), 0);
        assert_eq!(split_middle(8193, 4), 1);
        assert_eq!(split_middle(1 << 20, 0xFF), 0);
    }

    #[test]
    fn test_names() {
        let e = entry("data\\img\\Title.PNG", EntryKind::Plain, 0xFF);
        assert_eq!(e.name(), "Title.PNG");
        assert_eq!(e.extension().as_deref(), Some("png"));
        assert_eq!(e.output_path(), PathBuf::from("data").join("img").join("Title.PNG"));
        assert_eq!(entry(".hidden", EntryKind::Plain, 0xFF).extension(), None);
        assert!(!e.is_encrypted());
    }
}
