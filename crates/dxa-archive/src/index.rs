//! Directory index parsing.
//!
//! The decoded index holds three regions, addressed relative to its start:
//! a name table, the file table (0x48-byte records) and the directory table
//! (0x20-byte records). Directories are walked depth-first from the root at
//! directory-table offset 0; each subdirectory record points at the
//! directory record of its child.

use dxa_common::BinaryReader;
use encoding_rs::Encoding;
use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::crypto::DxaKey;
use crate::entry::{DxaEntry, EntryKind};
use crate::header::DxaHeader;
use crate::{Error, Result};

/// Attribute bit marking a subdirectory.
const ATTR_DIRECTORY: u32 = 0x10;

/// Path separator used in entry paths.
const SEPARATOR: char = '\\';

/// Directory table record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct DirectoryRecord {
    /// File table offset of this directory's own record, -1 for the root
    pub self_offset: i64,
    /// Directory table offset of the parent, -1 for the root
    pub parent_offset: i64,
    /// Number of records in this directory (low 32 bits significant)
    pub file_count: i64,
    /// File table offset of the first record
    pub file_table_offset: i64,
}

impl DirectoryRecord {
    /// Size on disk.
    pub const SIZE: usize = 0x20;

    /// Whether this record has no name of its own.
    #[inline]
    pub fn is_root(&self) -> bool {
        let (self_offset, parent_offset) = (self.self_offset, self.parent_offset);
        self_offset == -1 || parent_offset == -1
    }
}

/// File table record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct FileIndexRecord {
    /// Name table offset
    pub name_offset: i64,
    /// Attributes (low 32 bits significant)
    pub attributes: i64,
    /// Creation, access and write times
    pub reserved: [u8; 0x18],
    /// Payload offset from the base, or a directory table offset
    pub payload_offset: i64,
    /// Unpacked size
    pub raw_size: i64,
    /// LZ stream size, -1 when not LZ-packed
    pub lz_size: i64,
    /// Huffman block size, -1 when not Huffman-packed
    pub huffman_size: i64,
}

impl FileIndexRecord {
    /// Size on disk, also the stride between records.
    pub const SIZE: usize = 0x48;

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.attributes as u32 & ATTR_DIRECTORY != 0
    }
}

/// Map a Windows code page to its text encoding.
///
/// Unknown pages fall back to Shift-JIS, the DxLib default.
pub fn encoding_for_code_page(code_page: u32) -> &'static Encoding {
    match code_page {
        932 => encoding_rs::SHIFT_JIS,
        65001 => encoding_rs::UTF_8,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1252 => encoding_rs::WINDOWS_1252,
        other => {
            warn!(code_page = other, "unknown code page, decoding names as Shift-JIS");
            encoding_rs::SHIFT_JIS
        }
    }
}

/// A resolved name-table record.
struct Name {
    /// Decoded original name.
    text: String,
    /// Upper-cased bytes, used for key derivation.
    upper: Vec<u8>,
}

/// Directory being walked.
struct Frame {
    table_offset: i64,
    file_table_offset: i64,
    count: usize,
    next: usize,
    /// Path prefix ending in a separator, empty for the root.
    prefix: String,
    /// Upper-cased directory names, innermost first.
    key_names: Vec<Vec<u8>>,
}

/// Walks a decoded index into a flat entry list.
pub(crate) struct IndexParser<'a> {
    index: &'a [u8],
    header: &'a DxaHeader,
    encoding: &'static Encoding,
    password: Option<&'a [u8]>,
}

impl<'a> IndexParser<'a> {
    pub(crate) fn new(
        index: &'a [u8],
        header: &'a DxaHeader,
        encoding: &'static Encoding,
        password: Option<&'a [u8]>,
    ) -> Self {
        Self {
            index,
            header,
            encoding,
            password,
        }
    }

    /// Resolve every file entry.
    ///
    /// Entries come out in depth-first order: a subdirectory's contents
    /// appear where its record sits in the parent's file table.
    pub(crate) fn parse(&self) -> Result<Vec<DxaEntry>> {
        let mut entries = Vec::new();
        let mut stack = vec![self.enter(0, None)?];

        while let Some(frame) = stack.last_mut() {
            if frame.next == frame.count {
                stack.pop();
                continue;
            }
            let slot = frame.next;
            frame.next += 1;

            let frame = &stack[stack.len() - 1];
            let record: FileIndexRecord = self.record(
                self.header.file_table_offset,
                frame.file_table_offset + (slot * FileIndexRecord::SIZE) as i64,
            )?;

            if !record.is_directory() {
                entries.push(self.entry(frame, &record)?);
                continue;
            }

            let child = record.payload_offset;
            if child == 0 || child == frame.table_offset {
                return Err(Error::Recursion { offset: child });
            }
            if stack.iter().any(|f| f.table_offset == child) {
                return Err(Error::Recursion { offset: child });
            }
            let child_frame = self.enter(child, Some(frame))?;
            stack.push(child_frame);
        }

        debug!(entries = entries.len(), "parsed DXA directory index");
        Ok(entries)
    }

    fn enter(&self, table_offset: i64, parent: Option<&Frame>) -> Result<Frame> {
        let dir: DirectoryRecord = self.record(self.header.dir_table_offset, table_offset)?;

        let (prefix, key_names) = match parent {
            Some(parent) if !dir.is_root() => {
                let own: FileIndexRecord =
                    self.record(self.header.file_table_offset, dir.self_offset)?;
                let name = self.name(own.name_offset)?;

                let mut key_names = Vec::with_capacity(parent.key_names.len() + 1);
                key_names.push(name.upper);
                key_names.extend(parent.key_names.iter().cloned());
                (format!("{}{}{}", parent.prefix, name.text, SEPARATOR), key_names)
            }
            Some(parent) => (parent.prefix.clone(), parent.key_names.clone()),
            None => (String::new(), Vec::new()),
        };

        // Counts are 32-bit on disk; negative ones list nothing.
        let count = dir.file_count as i32;
        if count < 0 {
            debug!(table_offset, file_count = { dir.file_count }, "negative directory count");
        }
        let count = usize::try_from(count).unwrap_or(0);

        Ok(Frame {
            table_offset,
            file_table_offset: dir.file_table_offset,
            count,
            next: 0,
            prefix,
            key_names,
        })
    }

    fn entry(&self, frame: &Frame, record: &FileIndexRecord) -> Result<DxaEntry> {
        let name = self.name(record.name_offset)?;
        let path = format!("{}{}", frame.prefix, name.text);

        let payload_offset = non_negative(record.payload_offset, "payload offset", &path)?;
        let raw_size = non_negative(record.raw_size, "size", &path)?;
        let lz_size = optional_size(record.lz_size, "LZ size", &path)?;
        let huffman_size = optional_size(record.huffman_size, "Huffman size", &path)?;

        let offset = (self.header.base_offset as u64)
            .checked_add(payload_offset)
            .ok_or_else(|| Error::Format(format!("payload offset of {path} overflows")))?;

        let key = self.password.map(|password| {
            let names = std::iter::once(name.upper.as_slice())
                .chain(frame.key_names.iter().map(Vec::as_slice));
            DxaKey::for_entry(password, names)
        });

        Ok(DxaEntry::new(
            path,
            offset,
            raw_size,
            EntryKind::from_sizes(lz_size, huffman_size),
            self.header.huffman_cap_kb,
            key,
        ))
    }

    /// Read a name-table record.
    fn name(&self, offset: i64) -> Result<Name> {
        let mut reader = self.reader_at(offset)?;
        let packs = usize::from(reader.read_u16()?);
        let _parity = reader.read_u16()?;

        let upper = reader.read_bytes(packs * 4)?;
        let upper = match nul_position(upper) {
            Some(end) => &upper[..end],
            None => upper,
        };
        let original = reader.read_cstring_bytes()?;
        let (text, _) = self.encoding.decode_without_bom_handling(original);

        Ok(Name {
            text: text.into_owned(),
            upper: upper.to_vec(),
        })
    }

    fn reader_at(&self, offset: i64) -> Result<BinaryReader<'a>> {
        let mut reader = BinaryReader::new(self.index);
        reader
            .seek_to(offset)
            .map_err(|_| Error::Format(format!("index offset {offset:#x} out of range")))?;
        Ok(reader)
    }

    /// Read a fixed-size record at `table + offset`.
    fn record<T: FromBytes>(&self, table: i64, offset: i64) -> Result<T> {
        let position = table
            .checked_add(offset)
            .ok_or_else(|| Error::Format(format!("table offset {offset:#x} overflows")))?;
        self.reader_at(position)?
            .read_struct()
            .map_err(|_| Error::Format(format!("record at {position:#x} runs past the index")))
    }
}

fn nul_position(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == 0)
}

fn non_negative(value: i64, what: &str, path: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Format(format!("negative {what} {value} for {path}")))
}

/// -1 marks an absent layer.
fn optional_size(value: i64, what: &str, path: &str) -> Result<Option<u64>> {
    match value {
        -1 => Ok(None),
        _ => non_negative(value, what, path).map(Some),
    }
}
