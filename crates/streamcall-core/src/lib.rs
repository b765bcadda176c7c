//! streamcall-core - Core types and seams for streaming RPC calls
//!
//! This crate holds the value types shared by every layer of the call stack
//! (endpoints, method descriptors, status codes, stream events) and the two
//! seams a client plugs implementations into:
//!
//! - [`Transport`] opens one exchange per call and reports raw events
//! - [`Codec`] turns typed messages into payload bytes and back
//!
//! The call lifecycle itself lives in `streamcall-client`.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod method;
pub mod status;
pub mod transport;

pub use codec::{Codec, CodecError, JsonCodec};
pub use endpoint::{resolve, Endpoint, EndpointConfig};
pub use error::{ConfigurationError, ConnectionError};
pub use event::{CallState, Outcome, StreamEvent};
pub use method::{Cardinality, MethodDescriptor, Protocol};
pub use status::{Code, Metadata, Status};
pub use transport::{Exchange, ExchangeRequest, Transport, TransportError, TransportEvent};
