//! Remote store endpoint identity.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Transport security material for an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle of trusted roots. System roots are used when absent.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// PEM client certificate for mutual TLS.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

/// One remote store instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Endpoint {
    /// Plain-text endpoint with no credentials.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            database: 0,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Build the connection URL, escaping credentials.
    ///
    /// `rediss://` is used when TLS is configured; an insecure TLS
    /// config adds the `#insecure` fragment understood by the redis client.
    pub fn to_url(&self) -> Result<Url, ConfigError> {
        let scheme = if self.is_tls() { "rediss" } else { "redis" };
        let mut url = Url::parse(&format!("{}://localhost/", scheme))
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        url.set_host(Some(&self.host))
            .map_err(|e| ConfigError::Invalid(format!("host {:?}: {}", self.host, e)))?;
        url.set_port(Some(self.port))
            .map_err(|_| ConfigError::Invalid(format!("port {} rejected", self.port)))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| ConfigError::Invalid("password rejected".to_string()))?;
        }
        url.set_path(&self.database.to_string());

        if self.tls.as_ref().is_some_and(|tls| tls.insecure) {
            url.set_fragment(Some("insecure"));
        }

        Ok(url)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_host_port() {
        let endpoint = Endpoint::new("cache.internal", 6380).with_password("hunter2");
        assert_eq!(endpoint.to_string(), "cache.internal:6380");
        assert!(!format!("{:?}", endpoint).contains("hunter2"));
    }

    #[test]
    fn test_plain_url() {
        let url = Endpoint::new("127.0.0.1", 6379).to_url().unwrap();
        assert_eq!(url.as_str(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_tls_url_with_escaped_password() {
        let endpoint = Endpoint::new("redis.example.com", 6380)
            .with_password("p@ss/word")
            .with_tls(TlsConfig {
                insecure: true,
                ..Default::default()
            });
        let url = endpoint.to_url().unwrap();

        assert_eq!(url.scheme(), "rediss");
        assert_eq!(url.fragment(), Some("insecure"));
        assert_eq!(url.password(), Some("p%40ss%2Fword"));
        assert_eq!(url.port(), Some(6380));
    }

    #[test]
    fn test_deserialize_defaults() {
        let endpoint: Endpoint = serde_json::from_str(r#"{"host": "localhost"}"#).unwrap();
        assert_eq!(endpoint.port, DEFAULT_PORT);
        assert_eq!(endpoint.database, 0);
        assert!(endpoint.tls.is_none());
        assert!(endpoint.password.is_none());
    }
}
