//! List sink core: pooled, retrying delivery of log records to Redis lists.
//!
//! Takes already-formatted log payloads and appends each one to every
//! configured list (`RPUSH`) over a pooled connection.
//!
//! # Core Invariants
//!
//! 1. **Content-Agnostic**: payloads are never inspected or modified
//! 2. **Never Throws**: delivery failures are logged; only lifecycle misuse
//!    is returned to the caller
//! 3. **Independent Keys**: one key exhausting its retries does not stop
//!    delivery to the others
//! 4. **Scoped Connections**: a borrowed connection is returned on every
//!    exit path, and discarded after a connection-level failure
//!
//! # Architecture
//!
//! ```text
//! caller thread -> DeliveryEngine -> ConnectionPool -> Transport -> Redis
//!                       |                 ^
//!                       |__ release ______|
//! ```

pub mod cancel;
pub mod config;
pub mod destination;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod payload;
pub mod pool;
pub mod redis_transport;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use cancel::{CancelToken, WaitOutcome};
pub use config::SinkConfig;
pub use destination::Destination;
pub use endpoint::{Endpoint, TlsConfig};
pub use engine::{BulkReport, Delivery, DeliveryEngine, DeliveryFailure, EngineState};
pub use error::{ConfigError, LifecycleError, PoolError, SinkError, SinkResult, TransportError};
pub use payload::Payload;
pub use pool::{ConnectionPool, Lease, PoolConfig, PoolState};
pub use redis_transport::{RedisLink, RedisTransport};
pub use retry::{push_with_retry, KeyOutcome, RetryPolicy};
pub use transport::{ListLink, Transport};
