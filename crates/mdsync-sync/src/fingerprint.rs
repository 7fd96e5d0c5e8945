//! Content fingerprints for change detection.

use std::fmt;

use md5::{Digest, Md5};

/// 128-bit digest of a file's bytes.
///
/// Only used to notice changes between scans, never for integrity or security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprint raw bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Md5::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Read and fingerprint a file.
    pub fn of_file(path: &std::path::Path) -> std::io::Result<Self> {
        std::fs::read(path).map(|bytes| Self::of(&bytes))
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
