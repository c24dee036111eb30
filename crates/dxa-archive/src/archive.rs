//! DXA v8 archive reader.
//!
//! Opening an archive is eager: the header is validated, the index is
//! decrypted and decompressed, and every entry is resolved before the
//! handle is returned. After that the handle is read-only, so entries can
//! be read from any number of threads.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::crypto::{Cipher, DxaKey};
use crate::decompress::LzDecoder;
use crate::entry::DxaEntry;
use crate::extract::EntryExtractor;
use crate::header::DxaHeader;
use crate::huffman;
use crate::index::{encoding_for_code_page, IndexParser};
use crate::options::OpenOptions;
use crate::{Error, Result};

/// Archive bytes, either mapped from disk or owned.
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(data) => data,
        }
    }
}

/// An opened DXA v8 archive.
pub struct DxaArchive {
    data: Backing,
    name: String,
    header: DxaHeader,
    entries: Vec<DxaEntry>,
    cipher: Arc<dyn Cipher>,
    lz: Arc<dyn LzDecoder>,
}

impl DxaArchive {
    /// Open an unencrypted archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Open an archive with explicit options.
    pub fn open_with<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Self::load(Backing::Mapped(mmap), name, options)
    }

    /// Open an in-memory archive.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, OpenOptions::default())
    }

    /// Open an in-memory archive with explicit options.
    pub fn from_bytes_with(data: Vec<u8>, options: OpenOptions) -> Result<Self> {
        Self::load(Backing::Owned(data), "memory".to_string(), options)
    }

    fn load(data: Backing, name: String, options: OpenOptions) -> Result<Self> {
        let header = DxaHeader::parse(&data)?;

        let code_page = options
            .code_page
            .unwrap_or_else(|| u32::try_from(header.code_page).unwrap_or_default());
        let encoding = encoding_for_code_page(code_page);

        let password = if header.flags.is_encrypted() {
            let password = options
                .password
                .as_deref()
                .ok_or(Error::MissingCredential)?;
            Some(encoding.encode(password).0.into_owned())
        } else {
            None
        };

        let index = decode_index(
            &data,
            &header,
            password.as_deref(),
            options.cipher.as_ref(),
            options.lz.as_ref(),
        )?;
        let entries = IndexParser::new(&index, &header, encoding, password.as_deref()).parse()?;

        debug!(
            archive = %name,
            entries = entries.len(),
            encoding = encoding.name(),
            "opened DXA archive"
        );

        Ok(Self {
            data,
            name,
            header,
            entries,
            cipher: options.cipher,
            lz: options.lz,
        })
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parsed header.
    #[inline]
    pub fn header(&self) -> &DxaHeader {
        &self.header
    }

    /// Get the number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over entries in index order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &DxaEntry> + '_ {
        self.entries.iter()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&DxaEntry> {
        self.entries.get(index)
    }

    /// Find an entry by path (case-insensitive, either separator).
    pub fn find(&self, path: &str) -> Option<&DxaEntry> {
        let normalized = path.replace('/', "\\");
        self.entries
            .iter()
            .find(|e| e.path().eq_ignore_ascii_case(&normalized))
    }

    /// Bounded view of the archive bytes.
    pub fn view(&self, offset: u64, len: u64) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len() as u64)
            .map(|end| &self.data[offset as usize..end as usize])
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "range {offset:#x}+{len:#x} outside archive of {:#x} bytes",
                        self.data.len()
                    ),
                ))
            })
    }

    /// Read entry contents, undoing encryption and compression.
    pub fn read(&self, entry: &DxaEntry) -> Result<Vec<u8>> {
        let stored = self.view(entry.offset(), entry.on_disk_size())?;
        EntryExtractor::new(self.cipher.as_ref(), self.lz.as_ref()).extract(entry, stored)
    }

    /// Read entry by index.
    pub fn read_index(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::EntryNotFound(format!("index {index}")))?;
        self.read(entry)
    }

    /// Parallel extraction of multiple entries.
    #[cfg(feature = "parallel")]
    pub fn read_parallel(&self, entries: &[&DxaEntry]) -> Vec<Result<Vec<u8>>> {
        use rayon::prelude::*;

        entries.par_iter().map(|entry| self.read(entry)).collect()
    }

    /// Parallel extraction with a callback per entry.
    ///
    /// The callback runs under a lock, one entry at a time, in completion
    /// order. Only an out-of-range index stops the run.
    #[cfg(feature = "parallel")]
    pub fn extract_parallel<F>(&self, indices: &[usize], mut callback: F) -> Result<()>
    where
        F: FnMut(usize, &DxaEntry, Result<Vec<u8>>) + Send,
    {
        use parking_lot::Mutex;
        use rayon::prelude::*;

        let callback = Mutex::new(&mut callback);

        indices.par_iter().try_for_each(|&idx| {
            let entry = self
                .entries
                .get(idx)
                .ok_or_else(|| Error::EntryNotFound(format!("index {idx}")))?;

            let result = self.read(entry);
            callback.lock()(idx, entry, result);
            Ok(())
        })
    }
}

impl std::fmt::Debug for DxaArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DxaArchive")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Locate, decrypt and decompress the index.
///
/// A plain index is exactly `index_size` bytes at `index_offset`. A
/// compressed one runs from `index_offset` to the end of the file and
/// decodes through Huffman and then LZ to `index_size` bytes.
fn decode_index(
    data: &[u8],
    header: &DxaHeader,
    password: Option<&[u8]>,
    cipher: &dyn Cipher,
    lz: &dyn LzDecoder,
) -> Result<Vec<u8>> {
    let start = usize::try_from(header.index_offset)
        .ok()
        .filter(|&start| start <= data.len())
        .ok_or_else(|| {
            Error::Format(format!(
                "index offset {:#x} past end of file ({:#x} bytes)",
                header.index_offset,
                data.len()
            ))
        })?;
    let index_size = header.index_size as usize;
    let compressed = !header.flags.no_head_compress;

    let mut region = if compressed {
        data[start..].to_vec()
    } else {
        data.get(start..start + index_size)
            .ok_or_else(|| {
                Error::Format(format!(
                    "index of {index_size:#x} bytes at {start:#x} runs past end of file"
                ))
            })?
            .to_vec()
    };

    if let Some(password) = password {
        cipher.apply(&mut region, 0, &DxaKey::from_keyword(password));
    }

    if !compressed {
        return Ok(region);
    }

    debug!(stored = region.len(), index_size, "decompressing DXA index");
    let lz_stream = huffman::decode(&region)?;
    lz.decompress(&lz_stream, index_size)
}
