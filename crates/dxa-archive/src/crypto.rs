//! DXA v8 keyed XOR encryption.
//!
//! Keys are 7 bytes derived from a keyword with CRC-32: the even-indexed
//! keyword bytes produce key bytes 0..4, the odd-indexed bytes produce key
//! bytes 4..7. The transform XORs each byte with the key byte selected by
//! its absolute stream position, so it is its own inverse.

use std::fmt;

use dxa_common::crc;

/// Key length in bytes.
pub const KEY_LEN: usize = 7;

/// Appended to keywords shorter than four bytes.
const SHORT_KEYWORD_SUFFIX: &[u8] = b"DXARC";

/// A derived 7-byte DXA key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DxaKey([u8; KEY_LEN]);

impl DxaKey {
    /// Derive a key from raw keyword bytes.
    pub fn from_keyword(keyword: &[u8]) -> Self {
        let padded;
        let keyword = if keyword.len() < 4 {
            padded = [keyword, SHORT_KEYWORD_SUFFIX].concat();
            padded.as_slice()
        } else {
            keyword
        };

        let even = crc::hash_strided(keyword, 0, 2).to_le_bytes();
        let odd = crc::hash_strided(keyword, 1, 2).to_le_bytes();

        Self([even[0], even[1], even[2], even[3], odd[0], odd[1], odd[2]])
    }

    /// Derive the key of a single entry.
    ///
    /// The keyword is the archive password followed by the upper-cased
    /// names along the entry's path, innermost first: the file name, then
    /// each enclosing directory up to (but excluding) the root.
    pub fn for_entry<'a, I>(password: &[u8], upper_names: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut keyword = password.to_vec();
        for name in upper_names {
            keyword.extend_from_slice(name);
        }
        Self::from_keyword(&keyword)
    }

    /// Build a key from raw bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// The raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DxaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DxaKey(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Stateless, position-keyed, self-inverse transform.
///
/// Implementations must be deterministic: applying the same call twice
/// restores the input.
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Transform `data` in place as if it started at stream `position`.
    fn apply(&self, data: &mut [u8], position: u64, key: &DxaKey);
}

/// The DXA XOR cipher.
#[derive(Debug, Default, Clone, Copy)]
pub struct XorCipher;

impl Cipher for XorCipher {
    fn apply(&self, data: &mut [u8], position: u64, key: &DxaKey) {
        let start = (position % KEY_LEN as u64) as usize;
        for (byte, k) in data.iter_mut().zip(key.0.iter().cycle().skip(start)) {
            *byte ^= k;
        }
    }
}
