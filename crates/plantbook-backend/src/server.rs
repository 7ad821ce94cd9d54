//! `PlantUML` server backend.
//!
//! Diagrams are rendered by a remote `PlantUML` server: the source is
//! compressed with raw DEFLATE, encoded with the `PlantUML` base64 alphabet
//! and fetched from `<base>/<format>/<encoded>`.

use std::time::Duration;

use base64::Engine;
use base64::alphabet::Alphabet;
use base64::engine::GeneralPurpose;
use base64::engine::general_purpose::PAD;
use deflate::deflate_bytes;
use ureq::Agent;
use ureq::tls::TlsConfig;
use url::Url;

use crate::{Backend, DiagramFormat, RenderError};

/// `PlantUML`'s base64 dialect: digits first, `-` and `_` for 62 and 63.
const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid PlantUML base64 alphabet"),
    };

const PLANTUML_BASE64: GeneralPurpose = GeneralPurpose::new(&PLANTUML_ALPHABET, PAD);

/// Encode bytes with the `PlantUML` base64 alphabet.
#[must_use]
pub fn encode_plantuml_base64(data: &[u8]) -> String {
    PLANTUML_BASE64.encode(data)
}

/// Compress and encode diagram source into its URL-safe server form.
#[must_use]
pub fn encode_source(source: &str) -> String {
    encode_plantuml_base64(&deflate_bytes(source.as_bytes()))
}

/// Create HTTP agent with the specified timeout.
///
/// With `verify_certs` disabled the TLS certificate chain is not validated;
/// only meaningful for `https` addresses.
fn create_agent(timeout: Duration, verify_certs: bool) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .tls_config(
            TlsConfig::builder()
                .disable_verification(!verify_certs)
                .build(),
        )
        .build()
        .into()
}

/// `PlantUML` server reachable over HTTP or HTTPS.
pub struct ServerBackend {
    /// Base address, always ending with `/` so joins append to its path.
    base_url: Url,
    /// HTTP agent for connection pooling (reused across render calls).
    agent: Agent,
}

impl ServerBackend {
    /// Create a backend for the given server address.
    ///
    /// `verify_certs` only applies to `https` addresses.
    #[must_use]
    pub fn new(base_url: Url, timeout: Duration, verify_certs: bool) -> Self {
        let base_url = with_trailing_slash(base_url);
        if base_url.scheme() == "https" && !verify_certs {
            tracing::warn!(url = %base_url, "TLS certificate validation disabled for PlantUML server");
        }
        tracing::info!(url = %base_url, "selected PlantUML server backend");
        Self {
            agent: create_agent(timeout, verify_certs),
            base_url,
        }
    }

    /// Path segment the server uses for a format.
    fn endpoint(format: DiagramFormat) -> Option<&'static str> {
        match format {
            DiagramFormat::Svg => Some("svg"),
            DiagramFormat::Png => Some("png"),
            DiagramFormat::Txt => Some("txt"),
            DiagramFormat::Utxt => None,
        }
    }

    /// Request URL for an encoded diagram.
    fn url(&self, endpoint: &str, encoded: &str) -> Result<Url, RenderError> {
        self.base_url
            .join(&format!("{endpoint}/{encoded}"))
            .map_err(|e| {
                RenderError::Http(format!(
                    "cannot build request URL from '{}' ({e})",
                    self.base_url
                ))
            })
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, RenderError> {
        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| RenderError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let mut body = response.into_body();

        if !(200..300).contains(&status) {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(RenderError::Http(format!("HTTP {status}: {error_body}")));
        }

        body.read_to_vec()
            .map_err(|e| RenderError::Http(e.to_string()))
    }
}

impl Backend for ServerBackend {
    fn render(&self, source: &str, format: DiagramFormat) -> Result<Vec<u8>, RenderError> {
        let endpoint = Self::endpoint(format).ok_or(RenderError::Unsupported(format))?;
        let encoded = encode_source(source);
        let url = self.url(endpoint, &encoded)?;
        tracing::debug!(%url, "requesting diagram from PlantUML server");
        self.fetch(&url)
    }

    fn supports(&self, format: DiagramFormat) -> bool {
        Self::endpoint(format).is_some()
    }

    fn identify(&self) -> Result<String, RenderError> {
        Ok(format!("PlantUML server at {}", self.base_url))
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
