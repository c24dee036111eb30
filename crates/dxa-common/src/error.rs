//! Error types for dxa-common.

use thiserror::Error;

/// Common error type for DXA operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// End of bit stream reached while reading.
    #[error("bit stream exhausted: needed {needed} bits but only {available} available")]
    BitsExhausted { needed: usize, available: usize },

    /// More bits requested in one read than fit the result type.
    #[error("cannot read {0} bits at once (maximum is 64)")]
    BitCountTooLarge(u32),

    /// Invalid magic bytes encountered.
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    /// Seek target lies outside the buffer.
    #[error("seek to {position} is outside a buffer of {len} bytes")]
    SeekOutOfBounds { position: i64, len: usize },

    /// Missing null terminator in string.
    #[error("string missing null terminator")]
    MissingNullTerminator,
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
