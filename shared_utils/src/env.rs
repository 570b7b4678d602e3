use std::{fmt::Display, str::FromStr};

use thiserror::Error;

/// Errors related to environment-driven configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable required by the application is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable is set but could not be parsed.
    #[error("Invalid value for environment variable {name}: {value:?} ({reason})")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Raw value as found in the environment.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Reads an environment variable, returning a structured error if it's missing.
///
/// This is a thin wrapper around `std::env::var` that provides a more
/// ergonomic and specific error type for missing variables.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Reads and parses an optional override, e.g. `XREF_BATCH_SIZE=2000`.
///
/// Unset (or blank) variables yield `Ok(None)`; a value that fails to parse is an error
/// rather than being silently ignored.
pub fn parse_env_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(None),
    }
}

/// Parse `raw` as the value of variable `name`. Split out so callers (and tests) can
/// validate values without touching the process environment.
pub fn parse_value<T>(name: &str, raw: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
