//! CLI error types.

use plantbook_backend::BackendConfigError;
use plantbook_cache::CacheIoError;
use plantbook_config::ConfigError;
use plantbook_diagrams::ProcessError;

use crate::protocol::ProtocolError;

/// Top-level error; any of these ends the run with a nonzero exit status.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Backend(#[from] BackendConfigError),

    #[error("{0}")]
    CacheIo(#[from] CacheIoError),

    #[error("chapter '{chapter}': {source}")]
    Chapter {
        chapter: String,
        source: ProcessError,
    },
}
