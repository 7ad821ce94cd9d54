//! Cache key computation.
//!
//! Provides [`CacheKey`] for computing content-based hashes that name cached
//! artifacts.

use std::fmt;

use plantbook_backend::DiagramFormat;
use sha2::{Digest, Sha256};

/// Length of a hex encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Content hash identifying one rendered artifact.
///
/// Two diagrams with identical source and format always share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a diagram.
    ///
    /// # Hash Format
    ///
    /// SHA-256 of `"{format}:{source}"`, hex encoded.
    #[must_use]
    pub fn compute(source: &str, format: DiagramFormat) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(source.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the artifact for this key.
    #[must_use]
    pub fn file_name(&self, format: DiagramFormat) -> String {
        format!("{}.{}", self.0, format.extension())
    }

    /// Whether `name` has the shape of an artifact file name, that is a
    /// lowercase hex digest followed by a known artifact extension.
    #[must_use]
    pub fn is_artifact_file_name(name: &str) -> bool {
        let Some((stem, extension)) = name.split_once('.') else {
            return false;
        };
        stem.len() == DIGEST_HEX_LEN
            && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
            && DiagramFormat::from_extension(extension).is_some()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
