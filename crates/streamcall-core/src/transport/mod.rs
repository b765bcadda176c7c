//! Transport seam
//!
//! A [`Transport`] opens one exchange per call against an [`Endpoint`] and
//! reports what happens on it as a stream of [`TransportEvent`]s. The call
//! state machine in `streamcall-client` consumes that stream; connection
//! management, TLS and pooling stay behind this trait.
//!
//! Reporting rules for implementations:
//! - `Accepted` once the server acknowledged the exchange (response headers)
//! - `Message` for each response payload, in arrival order
//! - exactly one `Finished` last; a routing or connect failure is a
//!   `Finished` with a non-OK status and no preceding `Accepted`

mod error;

pub use error::TransportError;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::endpoint::Endpoint;
use crate::method::{MethodDescriptor, Protocol};
use crate::status::{Metadata, Status};

/// Raw event produced by a transport exchange
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The server accepted the exchange; carries response headers
    Accepted(Metadata),
    /// One encoded response message
    Message(Bytes),
    /// The exchange ended with this status
    Finished(Status),
}

/// Everything a transport needs to open one exchange
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub endpoint: Endpoint,
    pub method: MethodDescriptor,
    /// Content type of the encoded payload (e.g., "application/grpc-web+json")
    pub content_type: String,
    /// Encoded request message
    pub payload: Bytes,
    /// Request metadata sent as headers
    pub metadata: Metadata,
}

/// An open exchange: events in the order the transport produced them
///
/// Dropping the stream aborts the exchange and releases its resources.
pub type Exchange = BoxStream<'static, TransportEvent>;

/// Transport-agnostic interface for opening call exchanges
#[async_trait]
pub trait Transport: Send + Sync {
    /// Protocol family this transport speaks
    fn protocol(&self) -> Protocol;

    /// Probe that the endpoint is reachable
    ///
    /// Transports that connect lazily keep the default, which defers any
    /// connection failure to the first exchange.
    async fn connect(&self, _endpoint: &Endpoint) -> Result<(), TransportError> {
        Ok(())
    }

    /// Start an exchange
    ///
    /// Must not block; all I/O happens when the returned stream is polled.
    fn start(&self, request: ExchangeRequest) -> Exchange;
}
