//! Delivery engine: pushes formatted payloads to every destination key.
//!
//! Runs entirely on the calling thread. Each send borrows one connection,
//! pushes the payload to each key with its own retry budget, and hands the
//! connection back on every exit path. Operational failures are logged and
//! reported as a [`Delivery`]; only lifecycle misuse is returned as an error.

use crate::cancel::CancelToken;
use crate::config::SinkConfig;
use crate::destination::Destination;
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, LifecycleError};
use crate::payload::Payload;
use crate::pool::{ConnectionPool, PoolState};
use crate::redis_transport::RedisTransport;
use crate::retry::{push_with_retry, KeyOutcome, RetryPolicy};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine lifecycle: `Created -> Started -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Started,
    Stopped,
}

/// Outcome of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Every destination key accepted the payload.
    Delivered,
    /// At least one key did not; the reason has already been logged.
    Failed(DeliveryFailure),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Why a payload was not delivered everywhere.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Some keys exhausted their retries or had their retries cancelled.
    #[error("undelivered to keys exhausted={exhausted:?} cancelled={cancelled:?}")]
    Undelivered {
        exhausted: Vec<String>,
        cancelled: Vec<String>,
    },

    /// The connection failed mid-delivery; remaining keys were skipped.
    #[error("connection to {endpoint} lost: {reason}")]
    ConnectionLost { endpoint: String, reason: String },

    /// No connection could be borrowed.
    #[error("no connection to {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },
}

/// Outcome of a bulk send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    /// Correlates the log lines of one batch.
    pub batch_id: Uuid,
    /// Payloads accepted by every key.
    pub delivered: usize,
    /// Payloads attempted but not accepted by every key.
    pub failed: usize,
    /// Payloads never attempted because the connection was lost or
    /// could not be borrowed.
    pub abandoned: usize,
}

impl BulkReport {
    fn new() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            delivered: 0,
            failed: 0,
            abandoned: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.failed + self.abandoned
    }
}

/// What happened to one payload across all keys.
enum PayloadOutcome {
    Delivered,
    Undelivered {
        exhausted: Vec<String>,
        cancelled: Vec<String>,
    },
    ConnectionLost {
        key: String,
        reason: String,
    },
}

/// Best-effort delivery of log payloads to a list store.
pub struct DeliveryEngine<T: Transport> {
    name: String,
    destination: Destination,
    retry: RetryPolicy,
    pool: ConnectionPool<T>,
    state: Mutex<EngineState>,
    cancel: CancelToken,
}

impl DeliveryEngine<RedisTransport> {
    /// Engine backed by the Redis transport.
    pub fn redis(config: SinkConfig) -> Result<Self, ConfigError> {
        let transport = RedisTransport::new(config.io_timeout());
        Self::new(config, transport)
    }
}

impl<T: Transport> DeliveryEngine<T> {
    pub fn new(config: SinkConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let destination = config.destination()?;

        Ok(Self {
            name: config.name,
            destination,
            retry: config.retry,
            pool: ConnectionPool::new(transport, config.endpoint, config.pool),
            state: Mutex::new(EngineState::Created),
            cancel: CancelToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.pool.endpoint()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    /// A token that is cancelled when the engine shuts down.
    ///
    /// Pass it, or a token derived from it, to [`send_with_cancel`] to
    /// interrupt retry waits from elsewhere.
    ///
    /// [`send_with_cancel`]: DeliveryEngine::send_with_cancel
    pub fn child_token(&self) -> CancelToken {
        self.cancel.child_token()
    }

    /// Build the connection pool and accept sends.
    pub fn startup(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        match *state {
            EngineState::Started => {
                warn!(sink = %self.name, "Delivery engine already started");
                Ok(())
            }
            EngineState::Stopped => {
                error!(sink = %self.name, "Delivery engine cannot be restarted after shutdown");
                Err(LifecycleError::Stopped)
            }
            EngineState::Created => {
                if let Err(e) = self.pool.startup() {
                    error!(sink = %self.name, error = %e, "Failed to start connection pool");
                    return Err(LifecycleError::Stopped);
                }
                *state = EngineState::Started;
                info!(
                    sink = %self.name,
                    endpoint = %self.endpoint(),
                    keys = %self.destination,
                    "Delivery engine started"
                );
                Ok(())
            }
        }
    }

    /// Push one payload to every destination key.
    ///
    /// Never fails for operational reasons; see [`Delivery`].
    pub fn send(&self, payload: &Payload) -> Result<Delivery, LifecycleError> {
        self.send_with_cancel(payload, &self.cancel)
    }

    /// Like [`send`](DeliveryEngine::send), with retry waits interruptible
    /// through `cancel`.
    pub fn send_with_cancel(
        &self,
        payload: &Payload,
        cancel: &CancelToken,
    ) -> Result<Delivery, LifecycleError> {
        self.ensure_started()?;

        let mut lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(e) => {
                self.log_unreachable(&e.to_string());
                return Ok(Delivery::Failed(DeliveryFailure::Unavailable {
                    endpoint: self.endpoint().to_string(),
                    reason: e.to_string(),
                }));
            }
        };

        let outcome = self.deliver(lease.link(), payload, cancel);
        let healthy = !matches!(outcome, PayloadOutcome::ConnectionLost { .. });
        self.pool.release(lease, healthy);

        let delivery = match outcome {
            PayloadOutcome::Delivered => Delivery::Delivered,
            PayloadOutcome::Undelivered {
                exhausted,
                cancelled,
            } => Delivery::Failed(DeliveryFailure::Undelivered {
                exhausted,
                cancelled,
            }),
            PayloadOutcome::ConnectionLost { key, reason } => {
                self.log_connection_lost(&key, &reason);
                Delivery::Failed(DeliveryFailure::ConnectionLost {
                    endpoint: self.endpoint().to_string(),
                    reason,
                })
            }
        };

        Ok(delivery)
    }

    /// Push a batch of payloads in order over one borrowed connection.
    ///
    /// Each push keeps its own retry budget. A connection-level failure
    /// abandons the rest of the batch; it is not retried here.
    pub fn send_bulk<I>(&self, payloads: I) -> Result<BulkReport, LifecycleError>
    where
        I: IntoIterator<Item = Payload>,
    {
        self.ensure_started()?;

        let mut report = BulkReport::new();
        let mut payloads = payloads.into_iter();

        let mut lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(e) => {
                report.abandoned = payloads.count();
                error!(
                    sink = %self.name,
                    endpoint = %self.endpoint(),
                    batch_id = %report.batch_id,
                    abandoned = report.abandoned,
                    error = %e,
                    "Unable to connect to list store, abandoning batch"
                );
                return Ok(report);
            }
        };

        debug!(sink = %self.name, batch_id = %report.batch_id, "Sending batch");

        let mut healthy = true;
        for payload in payloads.by_ref() {
            match self.deliver(lease.link(), &payload, &self.cancel) {
                PayloadOutcome::Delivered => report.delivered += 1,
                PayloadOutcome::Undelivered { .. } => report.failed += 1,
                PayloadOutcome::ConnectionLost { key, reason } => {
                    report.failed += 1;
                    healthy = false;
                    self.log_connection_lost(&key, &reason);
                    break;
                }
            }
        }
        report.abandoned = payloads.count();

        self.pool.release(lease, healthy);

        if report.failed > 0 || report.abandoned > 0 {
            warn!(
                sink = %self.name,
                batch_id = %report.batch_id,
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                "Batch partially delivered"
            );
        } else {
            debug!(
                sink = %self.name,
                batch_id = %report.batch_id,
                delivered = report.delivered,
                "Batch delivered"
            );
        }

        Ok(report)
    }

    /// Stop accepting sends, interrupt retry waits, and drain the pool.
    ///
    /// The engine is `Stopped` afterwards whatever the pool reports.
    /// Returns whether the pool drained within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        {
            let mut state = self.state.lock();
            if *state == EngineState::Stopped {
                return true;
            }
            *state = EngineState::Stopped;
        }

        self.cancel.cancel();
        let drained = self.pool.shutdown(timeout);

        info!(sink = %self.name, drained = drained, "Delivery engine stopped");
        drained
    }

    fn ensure_started(&self) -> Result<(), LifecycleError> {
        match *self.state.lock() {
            EngineState::Started => Ok(()),
            EngineState::Created => {
                error!(sink = %self.name, "Delivery engine used before startup");
                Err(LifecycleError::NotStarted)
            }
            EngineState::Stopped => {
                error!(sink = %self.name, "Delivery engine used after shutdown");
                Err(LifecycleError::Stopped)
            }
        }
    }

    /// Push one payload to each key in order, on one link.
    fn deliver(&self, link: &mut T::Link, payload: &Payload, cancel: &CancelToken) -> PayloadOutcome {
        let mut exhausted = Vec::new();
        let mut cancelled = Vec::new();

        for key in self.destination.iter() {
            match push_with_retry(link, key, payload.as_bytes(), &self.retry, cancel) {
                KeyOutcome::Delivered { .. } => {}
                KeyOutcome::Exhausted { .. } => exhausted.push(key.to_string()),
                KeyOutcome::Cancelled { .. } => cancelled.push(key.to_string()),
                KeyOutcome::ConnectionLost { reason } => {
                    return PayloadOutcome::ConnectionLost {
                        key: key.to_string(),
                        reason,
                    };
                }
            }
        }

        if exhausted.is_empty() && cancelled.is_empty() {
            PayloadOutcome::Delivered
        } else {
            PayloadOutcome::Undelivered {
                exhausted,
                cancelled,
            }
        }
    }

    fn log_unreachable(&self, reason: &str) {
        error!(
            sink = %self.name,
            endpoint = %self.endpoint(),
            error = %reason,
            "Unable to connect to list store. Please ensure that it's running on {}",
            self.endpoint()
        );
    }

    fn log_connection_lost(&self, key: &str, reason: &str) {
        error!(
            sink = %self.name,
            endpoint = %self.endpoint(),
            key = %key,
            error = %reason,
            "Connection to list store lost, abandoning delivery"
        );
    }
}

impl<T: Transport> std::fmt::Debug for DeliveryEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("name", &self.name)
            .field("endpoint", self.endpoint())
            .field("keys", &self.destination.keys())
            .field("state", &self.state())
            .finish()
    }
}
