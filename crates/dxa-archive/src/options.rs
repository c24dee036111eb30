//! Archive open configuration.

use std::fmt;
use std::sync::Arc;

use crate::crypto::{Cipher, XorCipher};
use crate::decompress::{DxLz, LzDecoder};

/// Settings for a single archive open.
///
/// ```no_run
/// use dxa_archive::{DxaArchive, OpenOptions};
///
/// let options = OpenOptions::new().password("secret");
/// let archive = DxaArchive::open_with("data.dxa", options)?;
/// # Ok::<(), dxa_archive::Error>(())
/// ```
#[derive(Clone)]
pub struct OpenOptions {
    pub(crate) password: Option<String>,
    pub(crate) code_page: Option<u32>,
    pub(crate) cipher: Arc<dyn Cipher>,
    pub(crate) lz: Arc<dyn LzDecoder>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyword for encrypted archives.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Decode names with this code page instead of the header's.
    pub fn code_page(mut self, code_page: u32) -> Self {
        self.code_page = Some(code_page);
        self
    }

    /// Replace the decryption transform.
    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Replace the LZ decoder.
    pub fn lz_decoder(mut self, lz: Arc<dyn LzDecoder>) -> Self {
        self.lz = lz;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            password: None,
            code_page: None,
            cipher: Arc::new(XorCipher),
            lz: Arc::new(DxLz),
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("code_page", &self.code_page)
            .field("cipher", &self.cipher)
            .field("lz", &self.lz)
            .finish()
    }
}
