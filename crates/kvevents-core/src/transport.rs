//! Transport seam between the streaming client and the wire.
//!
//! A transport opens one [`EventConnection`] per connect attempt. The
//! connection owns both channels of an endpoint: the event subscription and
//! the replay request/response channel. It is dropped and recreated on every
//! reconnect.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::types::Endpoint;

/// Opens connections to endpoints.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Connect both channels of `endpoint`. May wait on the network; callers
    /// bound it with their own timeout.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn EventConnection>, TransportError>;
}

/// An established connection to one endpoint.
#[async_trait]
pub trait EventConnection: Send {
    /// Wait for the next multipart message. Callers bound the wait with the
    /// poll timeout; an error means the connection is no longer usable.
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError>;

    /// Ask the publisher to resend everything from `from_seq` onward and
    /// return the raw acknowledgement.
    async fn request_replay(&mut self, from_seq: u64) -> Result<Bytes, TransportError>;

    /// Release both channels.
    async fn close(self: Box<Self>);
}
