//! `${VAR}` references in string settings.
//!
//! `${VAR:-default}` falls back to `default` when `VAR` is unset. A setting
//! without any `${` is taken literally, so a command such as
//! `java -jar $HOME/plantuml.jar` keeps its bare `$`.

use std::borrow::Cow;

use crate::ConfigError;

/// A variable the lookup could not resolve.
struct Unset;

/// Expand `value` against the process environment.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    expand_with(value, field, |name| std::env::var(name).ok())
}

/// Expand `value`, resolving variable names through `lookup`.
fn expand_with<F>(value: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| lookup(name).map(Some).ok_or(Unset))
        .map(Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}
