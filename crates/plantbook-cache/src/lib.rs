//! Content-addressable render cache for plantbook.
//!
//! [`RenderCache`] wraps a [`Backend`] with two tiers:
//!
//! - an in-run registry that guarantees at most one backend call per
//!   [`CacheKey`], even when identical diagrams are rendered concurrently
//! - a durable [`ArtifactStore`] (normally a [`DirStore`]) that survives
//!   across runs and is written atomically
//!
//! Cache hits from either tier never reach the backend. Failures are
//! memoized in the registry, so a broken diagram is rendered once per run.
//!
//! # Example
//!
//! ```ignore
//! use plantbook_cache::{DirStore, RenderCache};
//!
//! let store = DirStore::open(".mdbook-plantuml-cache".into())?;
//! let cache = RenderCache::new(backend, Box::new(store));
//! let artifact = cache.render("@startuml\nA -> B\n@enduml", DiagramFormat::Svg)?;
//! println!("{}", artifact.path.display());
//! ```

mod key;
mod store;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use plantbook_backend::{Backend, DiagramFormat, RenderError};

pub use key::CacheKey;
pub use store::{ArtifactStore, DirStore, write_atomic};

/// Failure to create, read or write a cache or output directory entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", .path.display())]
pub struct CacheIoError {
    /// Path the operation targeted.
    pub path: PathBuf,
    /// Underlying error message.
    pub message: String,
}

impl CacheIoError {
    /// Wrap an I/O error for `path`.
    #[must_use]
    pub fn new(path: &Path, error: &std::io::Error) -> Self {
        Self::with_message(path, &error.to_string())
    }

    /// Error for `path` with a custom message.
    #[must_use]
    pub fn with_message(path: &Path, message: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.to_owned(),
        }
    }
}

/// Error returned by [`RenderCache::render`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The durable layer failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] CacheIoError),

    /// The backend failed to render the diagram.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A rendered artifact available on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Content key of the diagram.
    pub key: CacheKey,
    /// Format the artifact was rendered in.
    pub format: DiagramFormat,
    /// Location inside the durable store.
    pub path: PathBuf,
}

/// Counters describing how render requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Backend invocations.
    pub renders: usize,
    /// Requests answered by the in-run registry.
    pub registry_hits: usize,
    /// Requests answered by the durable store.
    pub disk_hits: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rendered, {} reused in this run, {} loaded from cache",
            self.renders, self.registry_hits, self.disk_hits
        )
    }
}

type Slot = Arc<OnceLock<Result<Artifact, CacheError>>>;

/// Two-tier render cache in front of a [`Backend`].
pub struct RenderCache {
    backend: Box<dyn Backend>,
    store: Box<dyn ArtifactStore>,
    registry: Mutex<HashMap<CacheKey, Slot>>,
    renders: AtomicUsize,
    registry_hits: AtomicUsize,
    disk_hits: AtomicUsize,
}

impl RenderCache {
    /// Create a cache rendering through `backend` and persisting into `store`.
    #[must_use]
    pub fn new(backend: Box<dyn Backend>, store: Box<dyn ArtifactStore>) -> Self {
        Self {
            backend,
            store,
            registry: Mutex::new(HashMap::new()),
            renders: AtomicUsize::new(0),
            registry_hits: AtomicUsize::new(0),
            disk_hits: AtomicUsize::new(0),
        }
    }

    /// The wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Return the artifact for `source` in `format`, rendering it if needed.
    ///
    /// Safe to call from many threads at once. For one key, exactly one
    /// caller resolves the artifact; the others wait for and share its
    /// result.
    pub fn render(&self, source: &str, format: DiagramFormat) -> Result<Artifact, CacheError> {
        if !self.backend.supports(format) {
            return Err(RenderError::Unsupported(format).into());
        }

        let key = CacheKey::compute(source, format);
        let slot = {
            let mut registry = self.registry.lock().unwrap();
            Arc::clone(registry.entry(key.clone()).or_default())
        };

        let mut resolved_here = false;
        let result = slot.get_or_init(|| {
            resolved_here = true;
            self.resolve(key, source, format)
        });
        if !resolved_here {
            self.registry_hits.fetch_add(1, Ordering::Relaxed);
        }
        result.clone()
    }

    /// Consult the durable store, falling back to the backend.
    fn resolve(
        &self,
        key: CacheKey,
        source: &str,
        format: DiagramFormat,
    ) -> Result<Artifact, CacheError> {
        if let Some(path) = self.store.get(&key, format)? {
            tracing::debug!(%key, %format, "diagram loaded from cache");
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Artifact { key, format, path });
        }

        tracing::debug!(%key, %format, "rendering diagram");
        self.renders.fetch_add(1, Ordering::Relaxed);
        let data = self.backend.render(source, format)?;
        let path = self.store.put(&key, format, &data)?;
        Ok(Artifact { key, format, path })
    }

    /// Snapshot of the request counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            renders: self.renders.load(Ordering::Relaxed),
            registry_hits: self.registry_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
        }
    }

    /// Log the request counters.
    pub fn log_summary(&self) {
        let stats = self.stats();
        if stats == CacheStats::default() {
            return;
        }
        tracing::info!("diagrams: {stats}");
    }
}
