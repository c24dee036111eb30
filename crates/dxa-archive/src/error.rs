//! Error types for the DXA archive crate.

use thiserror::Error;

/// Errors that can occur when working with DXA archives.
///
/// Archive-open errors abort the open entirely. Errors from reading a
/// single entry only concern that entry; the archive stays usable.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error (short reads, bad seeks).
    #[error("{0}")]
    Common(#[from] dxa_common::Error),

    /// Bad signature, version or header offsets.
    #[error("invalid DXA archive: {0}")]
    Format(String),

    /// The archive is encrypted and no password was supplied.
    #[error("archive is encrypted and no password was supplied")]
    MissingCredential,

    /// A compressed buffer did not have the length its header declares.
    #[error("size mismatch: supplied {supplied} bytes, expected {expected}")]
    SizeMismatch { supplied: u64, expected: u64 },

    /// A subdirectory references itself, offset zero, or an enclosing directory.
    #[error("infinite recursion in DXA directory index at table offset {offset:#x}")]
    Recursion { offset: i64 },

    /// A compressed stream is malformed or ends early.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Recognized but unimplemented archive feature.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

/// Result type for DXA operations.
pub type Result<T> = std::result::Result<T, Error>;
