//! Host-side appender for the list sink.
//!
//! Turns log records into framed payloads and ships them through a
//! [`list_sink_core::DeliveryEngine`]. Use [`ListAppender`] directly, or
//! install [`ListSinkLayer`] into a `tracing_subscriber` registry.

pub mod appender;
pub mod layer;
pub mod layout;
pub mod record;

#[cfg(test)]
mod tests;

pub use appender::{is_internal_target, ListAppender};
pub use layer::ListSinkLayer;
pub use layout::{JsonLayout, Layout, LayoutKind, RawLayout, TextLayout};
pub use record::LogRecord;
