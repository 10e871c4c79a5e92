//! Server configuration from environment variables.

use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7234;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_ENV: &str = "local";

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `EXECSTREAM_HOST`
    pub host: String,
    /// `EXECSTREAM_PORT`
    pub port: u16,
    /// `EXECSTREAM_LOG_LEVEL`, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// `EXECSTREAM_ENV`
    pub env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            env: DEFAULT_ENV.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Unset or empty variables take
    /// their default.
    ///
    /// # Errors
    /// Returns an error if `EXECSTREAM_PORT` is not a port number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match var("EXECSTREAM_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "EXECSTREAM_PORT",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => defaults.port,
        };

        Ok(Self {
            host: var("EXECSTREAM_HOST").unwrap_or(defaults.host),
            port,
            log_level: var("EXECSTREAM_LOG_LEVEL").unwrap_or(defaults.log_level),
            env: var("EXECSTREAM_ENV").unwrap_or(defaults.env),
        })
    }

    /// Address to bind, `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
