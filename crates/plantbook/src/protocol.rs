//! Host preprocessor protocol.
//!
//! The host writes `[context, book]` as JSON to stdin and expects the same
//! two-element array back on stdout once the book is transformed. Capability
//! queries (`plantbook supports <renderer>`) are answered by exit status
//! alone.

use serde_json::Value;

use crate::book::Book;

/// Host version line this preprocessor is built against.
const SUPPORTED_HOST_VERSION: &str = "0.4";

/// Renderer name for which support is denied.
const UNSUPPORTED_RENDERER: &str = "not-supported";

/// Malformed or unwritable protocol payload.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ProtocolError {
    #[error("cannot read preprocessor input: {0}")]
    Read(#[from] std::io::Error),

    #[error("malformed preprocessor input: {0}")]
    Parse(serde_json::Error),

    #[error("malformed preprocessor input: context must be a JSON object")]
    Context,

    #[error("cannot serialize preprocessor output: {0}")]
    Serialize(serde_json::Error),

    #[error("cannot write preprocessor output: {0}")]
    Write(std::io::Error),
}

/// Whether the preprocessor runs for `renderer`.
pub(crate) fn supports_renderer(renderer: &str) -> bool {
    renderer != UNSUPPORTED_RENDERER
}

/// Parse the `[context, book]` payload.
pub(crate) fn parse_input(input: &str) -> Result<(Value, Book), ProtocolError> {
    let (context, book): (Value, Book) =
        serde_json::from_str(input).map_err(ProtocolError::Parse)?;
    if !context.is_object() {
        return Err(ProtocolError::Context);
    }
    Ok((context, book))
}

/// Serialize the `[context, book]` payload.
pub(crate) fn render_output(context: &Value, book: &Book) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(&(context, book)).map_err(ProtocolError::Serialize)
}

/// Warn when the host version differs from the supported one.
pub(crate) fn check_host_version(context: &Value) {
    let Some(version) = context.get("mdbook_version").and_then(Value::as_str) else {
        return;
    };
    if !is_supported_version(version) {
        tracing::warn!(
            "plantbook was built for mdbook {SUPPORTED_HOST_VERSION}.x, but is being called from version {version}"
        );
    }
}

fn is_supported_version(version: &str) -> bool {
    version
        .strip_prefix(SUPPORTED_HOST_VERSION)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Whether the context asks for verbose logging.
///
/// Read before the configuration is loaded, so that configuration
/// diagnostics are already logged at the requested level.
pub(crate) fn verbose_requested(context: &Value) -> bool {
    context
        .pointer("/config/preprocessor/plantuml/verbose")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
