//! DXA - DxLib archive extraction library.
//!
//! This crate provides a unified interface to the DXA crates.
//!
//! # Crates
//!
//! - [`dxa_common`] - Common utilities (binary and bit reading, CRC-32)
//! - [`dxa_archive`] - DXA v8 archive reading (XOR + Huffman + LZ)
//!
//! # Example
//!
//! ```no_run
//! use dxa::prelude::*;
//!
//! let archive = DxaArchive::open_with("Data.dxa", OpenOptions::new().password("key"))?;
//!
//! if let Some(entry) = archive.find("bgm/title.ogg") {
//!     let data = archive.read(entry)?;
//!     println!("{}: {} bytes", entry.path(), data.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use dxa_archive as archive;
pub use dxa_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dxa_archive::{DxaArchive, DxaEntry, DxaHeader, EntryKind, OpenOptions};
    pub use dxa_common::{crc, BinaryReader, BitReader};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
