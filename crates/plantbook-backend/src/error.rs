//! Backend error types.

use std::path::PathBuf;
use std::time::Duration;

use crate::DiagramFormat;

/// Failure to render a single diagram.
///
/// Details are captured as strings so the error can be cloned and shared
/// between identical diagrams of one run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The render command could not be started.
    #[error("failed to start '{command}': {message}")]
    Spawn {
        /// Program that failed to start.
        command: String,
        /// OS error message.
        message: String,
    },

    /// The render command exited unsuccessfully.
    #[error("renderer exited with {status}\n  stderr: '{stderr}'")]
    Exit {
        /// Exit status description.
        status: String,
        /// Captured error stream.
        stderr: String,
    },

    /// File mode: the expected artifact was not produced.
    #[error("renderer did not produce {}\n  stderr: '{stderr}'", .path.display())]
    MissingOutput {
        /// Path the artifact was expected at.
        path: PathBuf,
        /// Captured error stream.
        stderr: String,
    },

    /// The backend call exceeded its deadline.
    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure or non-success HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Local I/O failure while preparing or collecting a render.
    #[error("I/O error: {0}")]
    Io(String),

    /// The active backend cannot produce the requested format.
    #[error("format '{0}' is not supported by this backend")]
    Unsupported(DiagramFormat),
}

/// Invalid backend configuration, detected before any rendering.
#[derive(Debug, thiserror::Error)]
pub enum BackendConfigError {
    /// The command line is empty or has unbalanced quoting.
    #[error("invalid PlantUML command '{0}'")]
    InvalidCommand(String),

    /// The server address cannot be parsed.
    #[error("invalid PlantUML server address '{address}': {message}")]
    InvalidServer {
        /// Configured address.
        address: String,
        /// Parse error.
        message: String,
    },

    /// The configured command does not answer a version query.
    #[error("PlantUML command '{command}' is not working: {source}")]
    NotWorking {
        /// Configured command line.
        command: String,
        /// Why the version query failed.
        source: RenderError,
    },

    /// No command was configured and none of the candidates works.
    #[error(
        "PlantUML executable could not be auto detected (tried {0}); set plantuml-cmd or put plantuml on the path"
    )]
    NotDetected(String),
}
