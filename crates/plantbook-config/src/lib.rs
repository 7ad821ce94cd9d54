//! Configuration management for plantbook.
//!
//! The host passes its configuration inside the preprocessor context. This
//! crate reads the `[preprocessor.plantuml]` section with serde, resolves
//! directories against the book root and validates everything before any
//! diagram is rendered.
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `plantuml-cmd`
//! - `output-dir`
//! - `cache-dir`
//! - `tag`
//!
//! `MDBOOK_PLANTUML_FAIL_ON_ERROR` (`1`, `0`, `true` or `false`) overrides
//! `fail-on-error`.

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use plantbook_backend::{BackendOptions, is_server_address, split_command};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Name of the preprocessor section in the host configuration.
pub const SECTION: &str = "plantuml";

/// Diagram tag used when none is configured.
pub const DEFAULT_TAG: &str = "plantuml";

/// Extra tags accepted while the tag is not overridden.
const DEFAULT_TAG_ALIASES: [&str; 1] = ["puml"];

/// Output image directory name, created inside the book source directory.
pub const DEFAULT_IMAGE_DIR: &str = "mdbook-plantuml-img";

/// Render cache directory, relative to the book root.
pub const DEFAULT_CACHE_DIR: &str = ".mdbook-plantuml-cache";

/// Environment variable overriding `fail-on-error`.
pub const FAIL_ON_ERROR_ENV: &str = "MDBOOK_PLANTUML_FAIL_ON_ERROR";

/// Keys the host itself places in every preprocessor section.
const HOST_KEYS: [&str; 5] = ["command", "renderers", "before", "after", "optional"];

/// Keys understood by plantbook.
const KNOWN_KEYS: [&str; 12] = [
    "plantuml-cmd",
    "piped",
    "use-data-uris",
    "clickable-img",
    "output-dir",
    "cache-dir",
    "timeout",
    "tag",
    "fail-on-error",
    "skip-clean",
    "accept-invalid-certs",
    "verbose",
];

/// Raw section as parsed from the host context (paths as strings).
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawConfig {
    plantuml_cmd: Option<String>,
    piped: bool,
    use_data_uris: bool,
    clickable_img: bool,
    output_dir: Option<String>,
    cache_dir: Option<String>,
    timeout: u64,
    tag: Option<String>,
    fail_on_error: bool,
    skip_clean: bool,
    accept_invalid_certs: bool,
    verbose: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            plantuml_cmd: None,
            piped: true,
            use_data_uris: true,
            clickable_img: false,
            output_dir: None,
            cache_dir: None,
            timeout: plantbook_backend::DEFAULT_TIMEOUT.as_secs(),
            tag: None,
            fail_on_error: true,
            skip_clean: false,
            accept_invalid_certs: false,
            verbose: false,
        }
    }
}

/// Resolved preprocessor configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local command line or server address. `None` auto-detects.
    pub plantuml_cmd: Option<String>,
    /// Piped (`true`) or file (`false`) invocation of local commands.
    pub piped: bool,
    /// Inline mode (data URIs) instead of image files.
    pub use_data_uris: bool,
    /// Wrap images in a link to themselves.
    pub clickable_img: bool,
    /// Flat output image directory.
    pub output_dir: PathBuf,
    /// On-disk render cache.
    pub cache_dir: PathBuf,
    /// Deadline for a single backend call.
    pub timeout: Duration,
    /// Fence tags recognized as diagrams; the first one is the configured tag.
    pub tags: Vec<String>,
    /// Abort on the first render failure.
    pub fail_on_error: bool,
    /// Keep the output image directory of a previous run.
    pub skip_clean: bool,
    /// Skip HTTPS certificate validation.
    pub accept_invalid_certs: bool,
    /// Debug level logging.
    pub verbose: bool,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The section has the wrong shape.
    #[error("invalid [preprocessor.plantuml] section: {0}")]
    Parse(#[from] serde_json::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config key (e.g., "`plantuml-cmd`").
        field: String,
        /// Error message (e.g., "${`PLANTUML_JAR`} not set").
        message: String,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."), Path::new("src"))
    }
}

impl Config {
    /// Load configuration from the host's preprocessor context.
    ///
    /// Reads `root`, `config.book.src` and `config.preprocessor.plantuml`;
    /// every part is optional.
    ///
    /// # Errors
    ///
    /// Returns error if the section cannot be parsed, expansion fails or
    /// validation fails.
    pub fn from_context(context: &Value) -> Result<Self, ConfigError> {
        let root = context
            .get("root")
            .and_then(Value::as_str)
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let book_src = context
            .pointer("/config/book/src")
            .and_then(Value::as_str)
            .unwrap_or("src");
        let section = context.pointer(&format!("/config/preprocessor/{SECTION}"));

        Self::load(section, &root, Path::new(book_src))
    }

    /// Load configuration from a section value.
    ///
    /// Relative directories resolve against `root`; the default output
    /// directory lives inside `book_src`.
    ///
    /// # Errors
    ///
    /// Returns error if the section cannot be parsed, expansion fails or
    /// validation fails.
    pub fn load(section: Option<&Value>, root: &Path, book_src: &Path) -> Result<Self, ConfigError> {
        let mut raw: RawConfig = match section {
            Some(value) => {
                warn_unknown_keys(value);
                serde_json::from_value(value.clone())?
            }
            None => RawConfig::default(),
        };

        // Expand environment variables before path resolution
        raw.expand_env_vars()?;

        let mut config = Self::resolve(raw, root, book_src);
        config.apply_fail_on_error_override(std::env::var(FAIL_ON_ERROR_ENV).ok().as_deref());
        config.validate()?;

        Ok(config)
    }

    /// Create default config with paths relative to the given book root.
    fn default_with_base(root: &Path, book_src: &Path) -> Self {
        Self::resolve(RawConfig::default(), root, book_src)
    }

    /// Resolve relative paths against the book root.
    fn resolve(raw: RawConfig, root: &Path, book_src: &Path) -> Self {
        let output_dir = match raw.output_dir {
            Some(dir) => root.join(dir),
            None => root.join(book_src).join(DEFAULT_IMAGE_DIR),
        };
        let cache_dir = root.join(raw.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR));

        let tags = match raw.tag {
            Some(tag) => vec![tag],
            None => std::iter::once(DEFAULT_TAG)
                .chain(DEFAULT_TAG_ALIASES)
                .map(str::to_owned)
                .collect(),
        };

        Self {
            plantuml_cmd: raw.plantuml_cmd,
            piped: raw.piped,
            use_data_uris: raw.use_data_uris,
            clickable_img: raw.clickable_img,
            output_dir,
            cache_dir,
            timeout: Duration::from_secs(raw.timeout),
            tags,
            fail_on_error: raw.fail_on_error,
            skip_clean: raw.skip_clean,
            accept_invalid_certs: raw.accept_invalid_certs,
            verbose: raw.verbose,
        }
    }

    /// Apply the `MDBOOK_PLANTUML_FAIL_ON_ERROR` override.
    fn apply_fail_on_error_override(&mut self, value: Option<&str>) {
        let Some(value) = value else {
            return;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => self.fail_on_error = true,
            "0" | "false" => self.fail_on_error = false,
            other => tracing::warn!(
                "ignoring {FAIL_ON_ERROR_ENV}={other}, expected 1, 0, true or false"
            ),
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_command()?;

        if self.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "timeout must be greater than 0".to_owned(),
            ));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ConfigError::Validation("tag cannot be empty".to_owned()));
        }

        require_dir_or_missing(&self.output_dir, "output-dir")?;
        require_dir_or_missing(&self.cache_dir, "cache-dir")?;
        Ok(())
    }

    /// Validate the command line or server address.
    fn validate_command(&self) -> Result<(), ConfigError> {
        let Some(command) = &self.plantuml_cmd else {
            return Ok(());
        };

        if command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "plantuml-cmd cannot be empty".to_owned(),
            ));
        }

        if is_server_address(command) {
            let url = Url::parse(command).map_err(|e| {
                ConfigError::Validation(format!("plantuml-cmd '{command}' is not a valid URL: {e}"))
            })?;
            if url.host_str().is_none_or(str::is_empty) {
                return Err(ConfigError::Validation(format!(
                    "plantuml-cmd '{command}' has no host"
                )));
            }
        } else if split_command(command).is_none() {
            return Err(ConfigError::Validation(format!(
                "plantuml-cmd '{command}' has unbalanced quoting"
            )));
        }

        Ok(())
    }

    /// Settings for constructing the render backend.
    #[must_use]
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            command: self.plantuml_cmd.clone(),
            piped: self.piped,
            timeout: self.timeout,
            verify_certs: !self.accept_invalid_certs,
        }
    }

    /// Last path component of the output image directory, used in links.
    #[must_use]
    pub fn image_dir_name(&self) -> String {
        self.output_dir
            .file_name()
            .map_or_else(|| DEFAULT_IMAGE_DIR.to_owned(), |name| name.to_string_lossy().into_owned())
    }
}

impl RawConfig {
    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&mut self.plantuml_cmd, "plantuml-cmd"),
            (&mut self.output_dir, "output-dir"),
            (&mut self.cache_dir, "cache-dir"),
            (&mut self.tag, "tag"),
        ] {
            if let Some(current) = value {
                *current = expand::expand_env(current, field)?;
            }
        }
        Ok(())
    }
}

/// Require a configured path to be a directory if it exists.
fn require_dir_or_missing(path: &Path, field: &str) -> Result<(), ConfigError> {
    if path.exists() && !path.is_dir() {
        return Err(ConfigError::Validation(format!(
            "{field} '{}' exists but is not a directory",
            path.display()
        )));
    }
    Ok(())
}

fn warn_unknown_keys(section: &Value) {
    let Some(map) = section.as_object() else {
        return;
    };
    for key in map.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) && !HOST_KEYS.contains(&key.as_str()) {
            tracing::warn!("ignoring unknown key '{key}' in [preprocessor.{SECTION}]");
        }
    }
}
