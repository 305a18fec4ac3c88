//! Static per-sink configuration.
//!
//! Built by the host and handed to the engine constructor. Loaded from a JSON
//! file, then selected values may be overridden from the environment.

use crate::destination::Destination;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::pool::PoolConfig;
use crate::redis_transport::DEFAULT_IO_TIMEOUT;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sink name.
pub const DEFAULT_SINK_NAME: &str = "list-sink";

/// Environment variable overriding the endpoint host.
pub const ENV_HOST: &str = "LIST_SINK_HOST";
/// Environment variable overriding the endpoint port.
pub const ENV_PORT: &str = "LIST_SINK_PORT";
/// Environment variable overriding the destination keys (comma separated).
pub const ENV_KEYS: &str = "LIST_SINK_KEYS";
/// Environment variable overriding the endpoint password.
pub const ENV_PASSWORD: &str = "LIST_SINK_PASSWORD";

/// Configuration for one sink instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name, used in log lines.
    #[serde(default = "default_name")]
    pub name: String,
    /// Remote store to write to.
    pub endpoint: Endpoint,
    /// Lists every record is appended to.
    pub keys: Vec<String>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Connect and socket read/write timeout, in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

fn default_name() -> String {
    DEFAULT_SINK_NAME.to_string()
}

fn default_io_timeout_ms() -> u64 {
    DEFAULT_IO_TIMEOUT.as_millis() as u64
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            endpoint: Endpoint::new("127.0.0.1", crate::endpoint::DEFAULT_PORT),
            keys: vec!["logs".to_string()],
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            io_timeout_ms: default_io_timeout_ms(),
        }
    }
}

impl SinkConfig {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, keys: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoint,
            keys,
            ..Default::default()
        }
    }

    /// Load from an optional file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SinkConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override endpoint and keys from environment variables.
    pub fn load_from_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.endpoint.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{} is not a port: {:?}", ENV_PORT, port)))?;
        }
        if let Some(keys) = lookup(ENV_KEYS) {
            self.keys = Destination::parse(&keys)?.keys().to_vec();
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.endpoint.password = Some(password);
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::Invalid("no host provided".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        self.destination()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.pool.max_total == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_total must be at least 1".to_string(),
            ));
        }
        if self.pool.min_idle > self.pool.max_idle {
            return Err(ConfigError::Invalid(format!(
                "pool.min_idle ({}) exceeds pool.max_idle ({})",
                self.pool.min_idle, self.pool.max_idle
            )));
        }
        if let Some(tls) = &self.endpoint.tls {
            if tls.client_cert.is_some() != tls.client_key.is_some() {
                return Err(ConfigError::Invalid(
                    "tls.client_cert and tls.client_key must be set together".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn destination(&self) -> Result<Destination, ConfigError> {
        Destination::new(self.keys.iter().cloned())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms.max(1))
    }
}
