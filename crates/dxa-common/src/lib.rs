//! Common utilities for DXA archive handling.
//!
//! This crate provides foundational types used across the DXA crates:
//!
//! - [`BinaryReader`] - Zero-copy little-endian reading from byte slices
//! - [`BitReader`] - MSB-first bit extraction for bit-packed headers
//! - [`crc`] - CRC-32 (IEEE) hashing used by key derivation

mod bits;
mod error;
mod reader;

pub mod crc;

pub use bits::BitReader;
pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
