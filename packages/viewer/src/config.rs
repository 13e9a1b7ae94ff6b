//! Connection settings for the viewer service.
//!
//! Settings are read from an optional TOML file and then overridden by
//! environment variables:
//!
//! | Variable                  | TOML key       | Default |
//! |---------------------------|----------------|---------|
//! | `SAFERPLACE_BACKEND`      | `backend`      | (none)  |
//! | `SAFERPLACE_TIMEOUT_SECS` | `timeout_secs` | `30`    |
//! | `SAFERPLACE_MAX_RETRIES`  | `max_retries`  | `3`     |
//! | `SAFERPLACE_CELL_SIZE`    | `cell_size`    | `1.0`   |
//!
//! ```toml
//! backend = "https://api.safer.place"
//! timeout_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use saferplace_region::DEFAULT_CELL_SIZE;
use serde::Deserialize;

use crate::ClientError;
use crate::retry::RetryPolicy;

/// Environment variable holding the backend base URL.
pub const BACKEND_ENV: &str = "SAFERPLACE_BACKEND";
/// Environment variable holding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "SAFERPLACE_TIMEOUT_SECS";
/// Environment variable holding the retry count.
pub const MAX_RETRIES_ENV: &str = "SAFERPLACE_MAX_RETRIES";
/// Environment variable holding the region cell size in degrees.
pub const CELL_SIZE_ENV: &str = "SAFERPLACE_CELL_SIZE";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Backend base URL.
    pub backend: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Region cell size in degrees.
    pub cell_size: Option<f64>,
}

impl ConfigFile {
    /// Reads the file at `path`, or returns an empty config if there is
    /// none.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] or [`ClientError::Toml`] if the file
    /// cannot be read or parsed.
    pub fn read(path: Option<&Path>) -> Result<Self, ClientError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::debug!("reading config from {}", path.display());
        Ok(toml::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Region cell size from `path` and the process environment, without
/// requiring a backend. Falls back to [`DEFAULT_CELL_SIZE`].
///
/// # Errors
///
/// Returns [`ClientError`] if the file cannot be read or the configured
/// value is malformed or not positive.
pub fn configured_cell_size(path: Option<&Path>) -> Result<f64, ClientError> {
    let file = ConfigFile::read(path)?;
    resolve_cell_size(&file, &|key| std::env::var(key).ok())
}

fn resolve_cell_size(
    file: &ConfigFile,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<f64, ClientError> {
    let Some(cell_size) = parse_env(env, CELL_SIZE_ENV)?.or(file.cell_size) else {
        return Ok(DEFAULT_CELL_SIZE);
    };
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(ClientError::Config {
            message: format!("cell size must be positive, got {cell_size}"),
        });
    }
    Ok(cell_size)
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    pub backend: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
    /// Region cell size in degrees. Regions larger than this are
    /// rejected before being sent.
    pub cell_size: f64,
}

impl ClientConfig {
    /// Creates a configuration for `backend` with default settings.
    #[must_use]
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            cell_size: DEFAULT_CELL_SIZE,
        }
    }

    /// Loads the configuration from `path` (if given) and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the file cannot be read or parsed, an
    /// environment variable is malformed, or no backend is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        Self::resolve(ConfigFile::read(path)?, |key| std::env::var(key).ok())
    }

    /// Merges `file` with the variables returned by `env`, which take
    /// precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if a value is malformed or no
    /// backend is configured.
    pub fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let backend = env(BACKEND_ENV)
            .or_else(|| file.backend.clone())
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| ClientError::Config {
                message: format!("no backend configured: set {BACKEND_ENV} or `backend`"),
            })?;

        let mut config = Self::new(backend.trim());

        if let Some(secs) = parse_env(&env, TIMEOUT_ENV)?.or(file.timeout_secs) {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_env(&env, MAX_RETRIES_ENV)?.or(file.max_retries) {
            config.retry.max_retries = retries;
        }
        config.cell_size = resolve_cell_size(&file, &env)?;

        Ok(config)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ClientError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|value| {
            value.trim().parse().map_err(|e| ClientError::Config {
                message: format!("{key}={value:?}: {e}"),
            })
        })
        .transpose()
}
