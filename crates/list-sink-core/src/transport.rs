//! The transport seam between the delivery core and the remote store.
//!
//! A [`Transport`] opens [`ListLink`]s to an [`Endpoint`]; a link appends
//! payloads to named lists. The pool owns links, the engine drives them.

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Factory for connections to one kind of list store.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Link: ListLink;

    /// Open a new connection to `endpoint`.
    ///
    /// Any failure here is connection-level.
    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Link, TransportError>;
}

/// A single open connection that can append to lists.
pub trait ListLink: Send + 'static {
    /// Append `payload` to the tail of the list named `key`.
    fn push(&mut self, key: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Cheap round trip used for health checks.
    fn ping(&mut self) -> Result<(), TransportError>;

    /// Clear per-use state before the link is recycled.
    fn reset(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release server-side resources before the link is dropped.
    fn close(&mut self) {}
}
