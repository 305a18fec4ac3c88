//! Appender front-end over the delivery engine.
//!
//! Lays records out, frames them into payloads and hands them to the engine.
//! Nothing here returns an error to the logging call site: refusals and
//! misuse are logged and swallowed.

use crate::layout::Layout;
use crate::record::LogRecord;
use list_sink_core::{
    BulkReport, Delivery, DeliveryEngine, LifecycleError, Payload, RedisTransport, SinkConfig,
    SinkResult, Transport,
};
use std::fmt;
use std::time::Duration;
use tracing::{error, warn};

/// Target prefixes whose records would loop back into the sink.
const INTERNAL_TARGETS: &[&str] = &["list_sink_core", "list_sink_appender", "redis", "r2d2"];

/// Whether records from `target` must not be appended.
pub fn is_internal_target(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|prefix| {
        target == *prefix
            || target
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

/// Ships log records to Redis lists.
pub struct ListAppender<T: Transport = RedisTransport> {
    engine: DeliveryEngine<T>,
    layout: Box<dyn Layout>,
}

impl ListAppender<RedisTransport> {
    /// Appender over a Redis-backed engine.
    pub fn redis(config: SinkConfig, layout: Box<dyn Layout>) -> SinkResult<Self> {
        Ok(Self::new(DeliveryEngine::redis(config)?, layout))
    }
}

impl<T: Transport> ListAppender<T> {
    pub fn new(engine: DeliveryEngine<T>, layout: Box<dyn Layout>) -> Self {
        Self { engine, layout }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    pub fn engine(&self) -> &DeliveryEngine<T> {
        &self.engine
    }

    pub fn start(&self) -> Result<(), LifecycleError> {
        self.engine.startup()
    }

    /// Stop the engine; returns whether it drained within `timeout`.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.engine.shutdown(timeout)
    }

    /// Lay out and send one record.
    ///
    /// Returns `None` when the record was refused or the appender is not
    /// running; both cases are logged.
    pub fn append(&self, record: &LogRecord) -> Option<Delivery> {
        if self.refuse(record) {
            return None;
        }

        match self.engine.send(&self.encode(record)) {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                self.log_misuse(e);
                None
            }
        }
    }

    /// Send records in order over one connection.
    ///
    /// Refused records are skipped before the batch is sent.
    pub fn append_batch<I>(&self, records: I) -> Option<BulkReport>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let payloads: Vec<Payload> = records
            .into_iter()
            .filter(|record| !self.refuse(record))
            .map(|record| self.encode(&record))
            .collect();

        match self.engine.send_bulk(payloads) {
            Ok(report) => Some(report),
            Err(e) => {
                self.log_misuse(e);
                None
            }
        }
    }

    /// Frame `header + body + footer` into one payload.
    fn encode(&self, record: &LogRecord) -> Payload {
        let header = self.layout.header();
        let body = self.layout.format(record);
        let footer = self.layout.footer();
        Payload::framed(header.as_deref(), &body, footer.as_deref())
    }

    fn refuse(&self, record: &LogRecord) -> bool {
        if is_internal_target(&record.target) {
            warn!(
                "Recursive logging from [{}] for appender [{}]",
                record.target,
                self.name()
            );
            return true;
        }
        false
    }

    fn log_misuse(&self, e: LifecycleError) {
        error!(
            appender = %self.name(),
            error = %e,
            "Unable to write to list store in appender [{}]",
            self.name()
        );
    }
}

impl<T: Transport> fmt::Display for ListAppender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.engine.endpoint();
        write!(
            f,
            "ListAppender{{name={}, host={}, port={}, keys={}}}",
            self.name(),
            endpoint.host,
            endpoint.port,
            self.engine.destination()
        )
    }
}

impl<T: Transport> fmt::Debug for ListAppender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListAppender")
            .field("engine", &self.engine)
            .finish()
    }
}
