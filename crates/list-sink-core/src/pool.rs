//! Connection pool provider for one remote endpoint.
//!
//! Wraps an r2d2 pool around a [`Transport`]. r2d2 handles the bounded free
//! list, borrow-time validation and idle expiry; this module adds the
//! release contract (discard on unhealthy, validate on return, `max_idle`),
//! a background evictor for idle validation, and a draining shutdown.

use crate::cancel::{CancelToken, WaitOutcome};
use crate::endpoint::Endpoint;
use crate::error::{PoolError, TransportError};
use crate::transport::{ListLink, Transport};
use parking_lot::RwLock;
use r2d2::{HandleError, ManageConnection, Pool, PooledConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool sizing and validation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections, idle plus borrowed.
    pub max_total: u32,
    /// Healthy connections returned beyond this many idle are closed.
    pub max_idle: u32,
    /// Idle connections the pool keeps open in the background.
    pub min_idle: u32,
    /// Ping a connection before handing it out.
    pub test_on_borrow: bool,
    /// Ping a connection when it is released as healthy.
    pub test_on_return: bool,
    /// Ping idle connections from the evictor.
    pub test_while_idle: bool,
    /// Idle connections checked per eviction run.
    pub eviction_batch_size: u32,
    /// Time between eviction runs, in milliseconds.
    pub eviction_interval_ms: u64,
    /// Idle connections older than this are closed, in milliseconds.
    pub min_evictable_idle_ms: u64,
    /// How long `acquire` waits for a connection, in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            test_on_borrow: true,
            test_on_return: false,
            test_while_idle: true,
            eviction_batch_size: 3,
            eviction_interval_ms: 30_000,
            min_evictable_idle_ms: 60_000,
            max_wait_ms: 2_000,
        }
    }
}

impl PoolConfig {
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn min_evictable_idle(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.max(1))
    }

    fn evictor_enabled(&self) -> bool {
        self.test_while_idle && self.eviction_interval_ms > 0 && self.eviction_batch_size > 0
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolState {
    /// Total connections (borrowed + idle).
    pub connections: u32,
    /// Currently idle connections.
    pub idle_connections: u32,
}

/// A transport link as held by the pool.
struct PooledLink<L: ListLink> {
    link: L,
    broken: bool,
}

impl<L: ListLink> Drop for PooledLink<L> {
    fn drop(&mut self) {
        self.link.close();
    }
}

struct LinkManager<T: Transport> {
    transport: Arc<T>,
    endpoint: Endpoint,
}

impl<T: Transport> ManageConnection for LinkManager<T> {
    type Connection = PooledLink<T::Link>;
    type Error = TransportError;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let link = self.transport.connect(&self.endpoint)?;
        Ok(PooledLink {
            link,
            broken: false,
        })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.link.ping()
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken
    }
}

/// Routes r2d2 background connection errors through tracing.
#[derive(Debug)]
struct TracingErrorHandler {
    endpoint: String,
}

impl HandleError<TransportError> for TracingErrorHandler {
    fn handle_error(&self, error: TransportError) {
        warn!(endpoint = %self.endpoint, error = %error, "Pool failed to open connection");
    }
}

/// A connection borrowed from the pool.
///
/// Hand it back with [`ConnectionPool::release`]. Dropping a lease without
/// releasing it returns the connection as-is.
pub struct Lease<T: Transport> {
    conn: PooledConnection<LinkManager<T>>,
    pool: Pool<LinkManager<T>>,
}

impl<T: Transport> Lease<T> {
    /// The underlying transport link.
    pub fn link(&mut self) -> &mut T::Link {
        &mut self.conn.link
    }
}

struct Evictor {
    token: CancelToken,
    handle: JoinHandle<()>,
}

enum Phase<T: Transport> {
    Created,
    Running {
        pool: Pool<LinkManager<T>>,
        evictor: Option<Evictor>,
    },
    ShutDown,
}

/// Thread-safe pool of transport connections to one endpoint.
pub struct ConnectionPool<T: Transport> {
    transport: Arc<T>,
    endpoint: Endpoint,
    config: PoolConfig,
    phase: RwLock<Phase<T>>,
}

impl<T: Transport> ConnectionPool<T> {
    pub fn new(transport: T, endpoint: Endpoint, config: PoolConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            endpoint,
            config,
            phase: RwLock::new(Phase::Created),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Build the pool. No connection is opened eagerly unless `min_idle`
    /// asks for one, so an unreachable store does not fail startup.
    pub fn startup(&self) -> Result<(), PoolError> {
        let mut phase = self.phase.write();
        match &*phase {
            Phase::Running { .. } => {
                warn!(endpoint = %self.endpoint, "Connection pool already started");
                return Ok(());
            }
            Phase::ShutDown => return Err(PoolError::ShutDown),
            Phase::Created => {}
        }

        let max_total = self.config.max_total.max(1);
        let idle_timeout = Some(self.config.min_evictable_idle()).filter(|d| !d.is_zero());

        let pool = Pool::builder()
            .max_size(max_total)
            .min_idle(Some(self.config.min_idle.min(max_total)))
            .test_on_check_out(self.config.test_on_borrow)
            .idle_timeout(idle_timeout)
            .max_lifetime(None)
            .connection_timeout(self.config.max_wait())
            .error_handler(Box::new(TracingErrorHandler {
                endpoint: self.endpoint.to_string(),
            }))
            .build_unchecked(LinkManager {
                transport: Arc::clone(&self.transport),
                endpoint: self.endpoint.clone(),
            });

        let evictor = if self.config.evictor_enabled() {
            self.spawn_evictor(pool.clone())
        } else {
            None
        };

        info!(
            endpoint = %self.endpoint,
            max_total = max_total,
            min_idle = self.config.min_idle,
            tls = self.endpoint.is_tls(),
            "Connection pool created"
        );

        *phase = Phase::Running { pool, evictor };
        Ok(())
    }

    /// Borrow a connection, waiting up to `max_wait`.
    pub fn acquire(&self) -> Result<Lease<T>, PoolError> {
        let pool = match &*self.phase.read() {
            Phase::Running { pool, .. } => pool.clone(),
            Phase::Created => return Err(PoolError::NotStarted),
            Phase::ShutDown => return Err(PoolError::ShutDown),
        };

        let conn = pool
            .get()
            .map_err(|e| PoolError::Unavailable(e.to_string()))?;

        Ok(Lease { conn, pool })
    }

    /// Return a borrowed connection.
    ///
    /// An unhealthy connection is closed. A healthy one is reset, optionally
    /// pinged, and recycled unless the idle set is already full.
    pub fn release(&self, lease: Lease<T>, healthy: bool) {
        let Lease { mut conn, pool } = lease;

        if !healthy {
            debug!(endpoint = %self.endpoint, "Discarding unhealthy connection");
            conn.broken = true;
            return;
        }

        if let Err(e) = conn.link.reset() {
            warn!(endpoint = %self.endpoint, error = %e, "Connection reset failed, discarding");
            conn.broken = true;
            return;
        }

        if self.config.test_on_return {
            if let Err(e) = conn.link.ping() {
                warn!(endpoint = %self.endpoint, error = %e, "Return validation failed, discarding");
                conn.broken = true;
                return;
            }
        }

        if pool.state().idle_connections >= self.config.max_idle {
            debug!(
                endpoint = %self.endpoint,
                max_idle = self.config.max_idle,
                "Idle set full, closing returned connection"
            );
            conn.broken = true;
        }
    }

    /// Current pool statistics; all zero when the pool is not running.
    pub fn state(&self) -> PoolState {
        match &*self.phase.read() {
            Phase::Running { pool, .. } => {
                let state = pool.state();
                PoolState {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                }
            }
            _ => PoolState::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.phase.read(), Phase::Running { .. })
    }

    /// Stop handing out connections and close the pooled ones.
    ///
    /// Waits up to `timeout` for borrowed connections to come back. Returns
    /// whether the pool drained in time; connections still borrowed are
    /// closed when their borrowers release them.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let previous = std::mem::replace(&mut *self.phase.write(), Phase::ShutDown);

        let (pool, evictor) = match previous {
            Phase::Running { pool, evictor } => (pool, evictor),
            Phase::Created | Phase::ShutDown => return true,
        };

        let deadline = Instant::now().checked_add(timeout);

        if let Some(evictor) = evictor {
            evictor.token.cancel();
            if evictor.handle.join().is_err() {
                warn!(endpoint = %self.endpoint, "Pool evictor thread panicked");
            }
        }

        let drained = loop {
            let state = pool.state();
            if state.idle_connections >= state.connections {
                break true;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    endpoint = %self.endpoint,
                    borrowed = state.connections - state.idle_connections,
                    "Timed out waiting for borrowed connections during shutdown"
                );
                break false;
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        drop(pool);
        info!(endpoint = %self.endpoint, drained = drained, "Connection pool shut down");
        drained
    }

    fn spawn_evictor(&self, pool: Pool<LinkManager<T>>) -> Option<Evictor> {
        let token = CancelToken::new();
        let interval = self.config.eviction_interval();
        let batch_size = self.config.eviction_batch_size as usize;
        let endpoint = self.endpoint.to_string();
        let thread_token = token.clone();

        let spawned = std::thread::Builder::new()
            .name("list-sink-evictor".to_string())
            .spawn(move || {
                while thread_token.wait_for(interval) == WaitOutcome::Elapsed {
                    evict_idle(&pool, batch_size, &endpoint);
                }
            });

        match spawned {
            Ok(handle) => Some(Evictor { token, handle }),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Failed to start pool evictor");
                None
            }
        }
    }
}

impl<T: Transport> Drop for ConnectionPool<T> {
    /// Stops the evictor and closes idle connections without waiting on borrowers.
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown(Duration::ZERO);
        }
    }
}

/// Ping up to `batch_size` idle connections and discard the ones that fail.
///
/// The batch is held checked out together so each idle connection is
/// tested once per run.
fn evict_idle<T: Transport>(pool: &Pool<LinkManager<T>>, batch_size: usize, endpoint: &str) {
    let mut batch = Vec::with_capacity(batch_size);
    while batch.len() < batch_size {
        match pool.try_get() {
            Some(conn) => batch.push(conn),
            None => break,
        }
    }

    let mut evicted = 0usize;
    for conn in batch.iter_mut() {
        if let Err(e) = conn.link.ping() {
            debug!(endpoint = %endpoint, error = %e, "Evicting idle connection");
            conn.broken = true;
            evicted += 1;
        }
    }

    if !batch.is_empty() {
        debug!(
            endpoint = %endpoint,
            tested = batch.len(),
            evicted = evicted,
            "Idle eviction run"
        );
    }
}
