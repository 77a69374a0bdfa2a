//! Client configuration.
//!
//! Loaded from `GREETCARD_*` environment variables by
//! [`ClientConfig::from_env`], or built in code with [`ClientConfig::new`].

use std::time::Duration;

use crate::messages::{GenerationMode, LengthMode};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Shortest accepted poll interval; shorter values are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Client configuration loaded from environment variables.
///
/// Everything except the API URL has a default suitable for production.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the card generation API.
    pub api_url: String,
    /// Fixed cadence of status polls (default: 5 s).
    pub poll_interval: Duration,
    /// HTTP request timeout (default: 30 s).
    pub request_timeout: Duration,
    pub length_mode: LengthMode,
    pub generation_mode: GenerationMode,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the API URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            length_mode: LengthMode::default(),
            generation_mode: GenerationMode::default(),
        }
    }

    /// Override the poll cadence. Values below [`MIN_POLL_INTERVAL`],
    /// including zero, are raised to it.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default        |
    /// |----------------------------------|----------------|
    /// | `GREETCARD_API_URL`              | (required)     |
    /// | `GREETCARD_POLL_INTERVAL_SECS`   | `5`            |
    /// | `GREETCARD_REQUEST_TIMEOUT_SECS` | `30`           |
    /// | `GREETCARD_LENGTH_MODE`          | `standard`     |
    /// | `GREETCARD_GENERATION_MODE`      | `hierarchical` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("GREETCARD_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("GREETCARD_API_URL"))?;

        let poll_interval_secs: u64 =
            parse_var("GREETCARD_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "GREETCARD_POLL_INTERVAL_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let request_timeout_secs: u64 =
            parse_var("GREETCARD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        let length_mode = parse_var("GREETCARD_LENGTH_MODE", LengthMode::default())?;
        let generation_mode = parse_var("GREETCARD_GENERATION_MODE", GenerationMode::default())?;

        Ok(Self {
            api_url,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            length_mode,
            generation_mode,
        })
    }
}

/// Read `var`, falling back to `default` when unset, failing when set but
/// unparseable.
fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
