//! Durable artifact storage.
//!
//! [`DirStore`] keeps rendered artifacts as flat files in one directory:
//!
//! ```text
//! {root}/
//! +-- 3f2a...c1.svg      # CacheKey + format extension
//! +-- 9b07...4e.png
//! ```
//!
//! Entries are append-only: an existing file is never rewritten. New files are
//! written to a temporary name inside the same directory and renamed into
//! place, so a concurrent reader never observes a partial artifact.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use plantbook_backend::DiagramFormat;
use tempfile::NamedTempFile;

use crate::{CacheIoError, CacheKey};

/// Durable key/format to artifact mapping.
pub trait ArtifactStore: Send + Sync {
    /// Path of a stored artifact, or `None` on miss.
    fn get(&self, key: &CacheKey, format: DiagramFormat) -> Result<Option<PathBuf>, CacheIoError>;

    /// Persist an artifact and return its path.
    fn put(
        &self,
        key: &CacheKey,
        format: DiagramFormat,
        data: &[u8],
    ) -> Result<PathBuf, CacheIoError>;
}

/// File-based [`ArtifactStore`] rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open the store at `root`, creating the directory if needed.
    pub fn open(root: PathBuf) -> Result<Self, CacheIoError> {
        fs::create_dir_all(&root).map_err(|e| CacheIoError::new(&root, &e))?;
        tracing::debug!(root = %root.display(), "opened render cache");
        Ok(Self { root })
    }

    /// Directory holding the artifacts.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for DirStore {
    fn get(&self, key: &CacheKey, format: DiagramFormat) -> Result<Option<PathBuf>, CacheIoError> {
        let path = self.root.join(key.file_name(format));
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Err(CacheIoError::with_message(&path, "not a regular file")),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheIoError::new(&path, &e)),
        }
    }

    fn put(
        &self,
        key: &CacheKey,
        format: DiagramFormat,
        data: &[u8],
    ) -> Result<PathBuf, CacheIoError> {
        write_atomic(&self.root, &key.file_name(format), data)
    }
}

/// Write `data` to `dir/file_name` unless the file already exists.
///
/// The data goes to a temporary file in `dir` first and is renamed into
/// place, so the final path only ever holds complete content.
pub fn write_atomic(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf, CacheIoError> {
    let path = dir.join(file_name);
    if path.is_file() {
        return Ok(path);
    }

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CacheIoError::new(dir, &e))?;
    tmp.write_all(data)
        .map_err(|e| CacheIoError::new(&path, &e))?;

    match tmp.persist_noclobber(&path) {
        Ok(_) => {}
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            // Same key persisted concurrently; content is identical.
        }
        Err(err) => return Err(CacheIoError::new(&path, &err.error)),
    }
    Ok(path)
}
