//! Error types for the list sink.

use thiserror::Error;

/// Errors reported by a transport connection.
///
/// The split between the two variants decides retry behaviour: a
/// `Command` failure is retried against the same connection, while a
/// `Connection` failure abandons the current unit of work and the
/// connection is discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection itself is unusable (refused, dropped, timed out).
    #[error("Connection error: {0}")]
    Connection(String),

    /// One operation failed on an otherwise healthy connection.
    #[error("Command error: {0}")]
    Command(String),
}

impl TransportError {
    /// Whether this error means the connection must not be reused.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }
}

/// Errors from the connection pool provider.
#[derive(Error, Debug)]
pub enum PoolError {
    /// `acquire` was called before `startup`.
    #[error("Connection pool has not been started")]
    NotStarted,

    /// `acquire` was called after `shutdown`.
    #[error("Connection pool has been shut down")]
    ShutDown,

    /// No connection could be produced within the wait limit.
    #[error("Connection unavailable: {0}")]
    Unavailable(String),
}

/// Misuse of the delivery engine lifecycle.
///
/// These are programming errors, kept apart from operational failures
/// which are logged and never returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// The engine was used before `startup`.
    #[error("Delivery engine used before startup")]
    NotStarted,

    /// The engine was used after `shutdown`.
    #[error("Delivery engine used after shutdown")]
    Stopped,
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading a config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error type for the list sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for list sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
