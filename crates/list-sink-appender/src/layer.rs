//! Tracing layer shipping events through a [`ListAppender`].

use crate::appender::{is_internal_target, ListAppender};
use crate::record::LogRecord;
use list_sink_core::{RedisTransport, Transport};
use std::cell::Cell;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

thread_local! {
    static APPENDING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the re-entry flag when the append returns or unwinds.
struct AppendGuard;

impl AppendGuard {
    fn enter() -> Option<Self> {
        APPENDING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(AppendGuard)
            }
        })
    }
}

impl Drop for AppendGuard {
    fn drop(&mut self) {
        APPENDING.with(|flag| flag.set(false));
    }
}

/// A `tracing_subscriber` layer appending every event to Redis lists.
///
/// The sink's own events are dropped here without the appender's
/// recursion warning, and events raised while an append is in progress on
/// the same thread are ignored.
pub struct ListSinkLayer<T: Transport = RedisTransport> {
    appender: Arc<ListAppender<T>>,
    max_level: Level,
}

impl<T: Transport> ListSinkLayer<T> {
    pub fn new(appender: Arc<ListAppender<T>>) -> Self {
        Self {
            appender,
            max_level: Level::INFO,
        }
    }

    /// Most verbose level shipped; defaults to `INFO`.
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    pub fn appender(&self) -> &Arc<ListAppender<T>> {
        &self.appender
    }
}

impl<S, T> Layer<S> for ListSinkLayer<T>
where
    S: Subscriber,
    T: Transport,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level || is_internal_target(metadata.target()) {
            return;
        }

        let Some(_guard) = AppendGuard::enter() else {
            return;
        };

        self.appender.append(&LogRecord::from_event(event));
    }
}
