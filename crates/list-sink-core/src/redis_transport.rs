//! Redis implementation of the transport seam.
//!
//! Pushes are `RPUSH key payload` on a synchronous connection. Errors are
//! classified so that anything which leaves the socket in an unknown state
//! (I/O failure, refusal, drop, timeout) is connection-level, and every
//! server reply error (`WRONGTYPE`, `OOM`, `READONLY`, `LOADING`, ...) is a
//! per-command failure that may succeed on retry.

use crate::endpoint::{Endpoint, TlsConfig};
use crate::error::TransportError;
use crate::transport::{ListLink, Transport};
use redis::{Client, Commands, Connection, RedisError};
use std::time::Duration;
use tracing::debug;

/// Default connect timeout and socket read/write timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens synchronous Redis connections.
#[derive(Debug, Clone)]
pub struct RedisTransport {
    io_timeout: Duration,
}

impl RedisTransport {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    fn client(&self, endpoint: &Endpoint) -> Result<Client, TransportError> {
        let url = endpoint
            .to_url()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let client = match &endpoint.tls {
            Some(tls) if tls.ca_cert.is_some() || tls.client_cert.is_some() => {
                Client::build_with_tls(url.as_str(), load_certificates(tls)?)
            }
            _ => Client::open(url.as_str()),
        };

        client.map_err(|e| TransportError::Connection(e.to_string()))
    }
}

impl Default for RedisTransport {
    fn default() -> Self {
        Self::new(DEFAULT_IO_TIMEOUT)
    }
}

impl Transport for RedisTransport {
    type Link = RedisLink;

    fn connect(&self, endpoint: &Endpoint) -> Result<RedisLink, TransportError> {
        let client = self.client(endpoint)?;
        let conn = client
            .get_connection_with_timeout(self.io_timeout)
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        conn.set_read_timeout(Some(self.io_timeout))
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        conn.set_write_timeout(Some(self.io_timeout))
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        debug!(endpoint = %endpoint, tls = endpoint.is_tls(), "Opened Redis connection");

        Ok(RedisLink { conn })
    }
}

/// An open Redis connection.
pub struct RedisLink {
    conn: Connection,
}

impl ListLink for RedisLink {
    fn push(&mut self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
        let _len: i64 = self.conn.rpush(key, payload).map_err(classify)?;
        Ok(())
    }

    fn ping(&mut self) -> Result<(), TransportError> {
        let _pong: String = redis::cmd("PING").query(&mut self.conn).map_err(classify)?;
        Ok(())
    }

    fn close(&mut self) {
        // QUIT is best effort; the socket is dropped either way.
        let result: redis::RedisResult<()> = redis::cmd("QUIT").query(&mut self.conn);
        if let Err(e) = result {
            debug!(error = %e, "QUIT failed while closing Redis connection");
        }
    }
}

/// Map a Redis client error onto the connection/command split.
pub fn classify(error: RedisError) -> TransportError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Command(error.to_string())
    }
}

fn load_certificates(tls: &TlsConfig) -> Result<redis::TlsCertificates, TransportError> {
    let read = |path: &std::path::Path| {
        std::fs::read(path).map_err(|e| {
            TransportError::Connection(format!(
                "Failed to read TLS material {}: {}",
                path.display(),
                e
            ))
        })
    };

    let root_cert = tls.ca_cert.as_deref().map(read).transpose()?;

    let client_tls = match (&tls.client_cert, &tls.client_key) {
        (Some(cert), Some(key)) => Some(redis::ClientTlsConfig {
            client_cert: read(cert)?,
            client_key: read(key)?,
        }),
        (None, None) => None,
        _ => {
            return Err(TransportError::Connection(
                "client_cert and client_key must be configured together".to_string(),
            ))
        }
    };

    Ok(redis::TlsCertificates {
        client_tls,
        root_cert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    #[test]
    fn test_reply_errors_are_command_level() {
        let err = RedisError::from((
            ErrorKind::TypeError,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        ));
        assert!(matches!(classify(err), TransportError::Command(_)));

        let err = RedisError::from((ErrorKind::ReadOnly, "READONLY replica"));
        assert!(matches!(classify(err), TransportError::Command(_)));
    }

    #[test]
    fn test_io_errors_are_connection_level() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(classify(RedisError::from(io)).is_connection_level());

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        assert!(classify(RedisError::from(io)).is_connection_level());
    }

    #[test]
    fn test_connect_refused_is_connection_level() {
        let transport = RedisTransport::new(Duration::from_millis(200));
        // Port 1 is reserved and closed on any sane test host.
        let result = transport.connect(&Endpoint::new("127.0.0.1", 1));
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[test]
    fn test_half_configured_client_tls_is_rejected() {
        let tls = TlsConfig {
            client_cert: Some("/tmp/cert.pem".into()),
            ..Default::default()
        };
        assert!(load_certificates(&tls).is_err());
    }
}
