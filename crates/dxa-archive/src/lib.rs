//! DxLib archive (DXA v8) reader.
//!
//! DXA archives pack a game's assets behind up to three layers per entry:
//!
//! - A position-keyed XOR cipher, keyed per entry from the archive password
//!   and the entry's path
//! - An adaptive Huffman stage, optionally limited to the head and tail of
//!   large payloads
//! - The DxLib LZ stage
//!
//! The index (name, file and directory tables) can be encrypted and
//! compressed the same way.
//!
//! # Example
//!
//! ```no_run
//! use dxa_archive::{DxaArchive, OpenOptions};
//!
//! let archive = DxaArchive::open_with("data.dxa", OpenOptions::new().password("key"))?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.path(), entry.raw_size());
//! }
//!
//! if let Some(entry) = archive.find("img/title.png") {
//!     let data = archive.read(entry)?;
//! }
//! # Ok::<(), dxa_archive::Error>(())
//! ```

mod archive;
mod crypto;
mod decompress;
mod entry;
mod error;
mod extract;
mod header;
mod index;
mod options;

pub mod huffman;

#[cfg(test)]
mod test_support;

pub use archive::DxaArchive;
pub use crypto::{Cipher, DxaKey, XorCipher, KEY_LEN};
pub use decompress::{decompress_lz, DxLz, LzDecoder};
pub use entry::{DxaEntry, EntryKind};
pub use error::{Error, Result};
pub use header::{DxaHeader, HeaderFlags, RawHeader};
pub use index::{encoding_for_code_page, DirectoryRecord, FileIndexRecord};
pub use options::OpenOptions;
