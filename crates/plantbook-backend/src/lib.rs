//! `PlantUML` render backends for plantbook.
//!
//! A [`Backend`] turns diagram source into artifact bytes. Three variants
//! exist behind the one trait:
//! - [`ShellBackend`]: a local `PlantUML` command, piped or file based
//! - [`ServerBackend`] over `http://` or `https://` (the latter validating the
//!   certificate chain unless disabled)
//!
//! Callers build a backend with [`create`] and never inspect which variant is
//! active.
//!
//! # Example
//!
//! ```ignore
//! use plantbook_backend::{BackendOptions, DiagramFormat, create};
//!
//! let backend = create(&BackendOptions::default())?;
//! let svg = backend.render("@startuml\nA -> B\n@enduml", DiagramFormat::Svg)?;
//! ```

mod error;
mod format;
mod server;
mod shell;

use std::time::Duration;

use url::Url;

pub use error::{BackendConfigError, RenderError};
pub use format::DiagramFormat;
pub use server::{ServerBackend, encode_plantuml_base64, encode_source};
pub use shell::{ShellBackend, split_command};

/// Default deadline for a single backend call (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Commands tried, in order, when none is configured.
const CANDIDATE_COMMANDS: [&str; 2] = ["plantuml", "java -jar plantuml.jar"];

/// Renders diagram source to artifact bytes.
pub trait Backend: Send + Sync {
    /// Render `source` in the given format.
    fn render(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError>;

    /// Whether this backend can produce `format`.
    fn supports(&self, format: DiagramFormat) -> bool;

    /// Human-readable version of the renderer, for diagnostics.
    fn identify(&self) -> Result<String, RenderError>;
}

/// Settings needed to construct a backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Command line, or `http(s)://` server address. `None` auto-detects.
    pub command: Option<String>,
    /// Piped (`true`) or file (`false`) invocation for local commands.
    pub piped: bool,
    /// Deadline for a single backend call.
    pub timeout: Duration,
    /// Validate the HTTPS certificate chain.
    pub verify_certs: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            command: None,
            piped: true,
            timeout: DEFAULT_TIMEOUT,
            verify_certs: true,
        }
    }
}

/// Whether a configured command is actually a server address.
#[must_use]
pub fn is_server_address(command: &str) -> bool {
    command.starts_with("http://") || command.starts_with("https://")
}

/// Create the backend described by `options`.
///
/// Local commands must answer a version query so that a broken command
/// is reported before any rendering starts.
pub fn create(options: &BackendOptions) -> Result<Box<dyn Backend>, BackendConfigError> {
    match options.command.as_deref() {
        Some(address) if is_server_address(address) => {
            let url = Url::parse(address).map_err(|e| BackendConfigError::InvalidServer {
                address: address.to_owned(),
                message: e.to_string(),
            })?;
            Ok(Box::new(ServerBackend::new(
                url,
                options.timeout,
                options.verify_certs,
            )))
        }
        Some(command_line) => {
            let backend = shell_backend(command_line, options)?;
            let version = backend
                .identify()
                .map_err(|source| BackendConfigError::NotWorking {
                    command: command_line.to_owned(),
                    source,
                })?;
            tracing::info!("detected {version}");
            Ok(Box::new(backend))
        }
        None => detect(options),
    }
}

fn shell_backend(
    command_line: &str,
    options: &BackendOptions,
) -> Result<ShellBackend, BackendConfigError> {
    let Some((program, args)) = split_command(command_line)
        .as_deref()
        .and_then(<[String]>::split_first)
        .map(|(program, args)| (program.clone(), args.to_vec()))
    else {
        return Err(BackendConfigError::InvalidCommand(command_line.to_owned()));
    };
    Ok(ShellBackend::new(program, args, options.piped, options.timeout))
}

/// Try the candidate commands until one answers a version query.
fn detect(options: &BackendOptions) -> Result<Box<dyn Backend>, BackendConfigError> {
    for candidate in CANDIDATE_COMMANDS {
        let backend = shell_backend(candidate, options)?;
        match backend.identify() {
            Ok(version) => {
                tracing::info!(command = candidate, "detected {version}");
                return Ok(Box::new(backend));
            }
            Err(e) => tracing::debug!(command = candidate, "PlantUML candidate rejected: {e}"),
        }
    }
    Err(BackendConfigError::NotDetected(CANDIDATE_COMMANDS.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(command: &str) -> BackendOptions {
        BackendOptions {
            command: Some(command.to_owned()),
            ..BackendOptions::default()
        }
    }

    #[test]
    fn test_is_server_address() {
        assert!(is_server_address("http://localhost:8080/plantuml"));
        assert!(is_server_address("https://www.plantuml.com/plantuml"));
        assert!(!is_server_address("plantuml"));
        assert!(!is_server_address("java -jar http.jar"));
    }

    #[test]
    fn test_create_server_backend() {
        let backend = create(&options("https://www.plantuml.com/plantuml")).unwrap();
        assert_eq!(
            backend.identify().unwrap(),
            "PlantUML server at https://www.plantuml.com/plantuml/"
        );
    }

    #[test]
    fn test_create_invalid_server_address() {
        let err = create(&options("http://")).err().unwrap();
        assert!(matches!(err, BackendConfigError::InvalidServer { .. }));
    }

    #[test]
    fn test_create_invalid_command() {
        let err = create(&options("plantuml \"unterminated")).err().unwrap();
        assert!(matches!(err, BackendConfigError::InvalidCommand(_)));
    }

    #[test]
    fn test_create_blank_command() {
        for blank in ["", "   "] {
            let err = create(&options(blank)).err().unwrap();
            assert!(
                matches!(err, BackendConfigError::InvalidCommand(_)),
                "{blank:?}: {err}"
            );
        }
    }

    #[test]
    fn test_create_command_not_working() {
        let err = create(&options("plantbook-definitely-not-installed"))
            .err()
            .unwrap();
        assert!(matches!(err, BackendConfigError::NotWorking { .. }));
    }
}
