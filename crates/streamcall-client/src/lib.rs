//! Streaming RPC client
//!
//! Opens calls against a remote service through a shared [`Channel`] and
//! delivers each call's events to subscribers: zero or more `Data` messages
//! followed by exactly one terminal `Status` or `End`.
//!
//! # Example
//!
//! ```rust,no_run
//! use streamcall_client::echo::{EchoClient, EchoRequest};
//! use streamcall_client::StreamEvent;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = EchoClient::connect("http://localhost:8080")?;
//!
//!     let call = client.echo(&EchoRequest::new("Hello World!"));
//!     call.subscribe(|event| match event {
//!         StreamEvent::Data(response) => println!("{}", response.message),
//!         StreamEvent::Status(status) => println!("{} {}", status.code, status.message),
//!         StreamEvent::End => println!("end"),
//!     });
//!
//!     // Resolves once the terminal event has been dispatched
//!     let outcome = call.finished().await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle
//!
//! - [`ClientStub::invoke`] returns immediately with a call in `Opening`
//! - the transport's acknowledgement moves it to `Streaming`
//! - the call ends `Completed`, `Failed` or `Cancelled`; terminal states
//!   are absorbing and [`StreamingCall::cancel`] on a finished call is a no-op
//! - [`Channel::close`] fails every live call with `UNAVAILABLE`
//!
//! # Testing
//!
//! The `testing` module provides a scriptable [`testing::MockTransport`] and
//! an HTTP [`testing::EchoServer`] speaking grpc-web.

mod call;
mod channel;
pub mod echo;
mod error;
pub mod grpc_web;
mod stub;
pub mod testing;

pub use call::{EventStream, StreamingCall, SubscriptionToken};
pub use channel::Channel;
pub use error::{ClientError, Result};
pub use stub::ClientStub;

// Re-export core types for convenience
pub use streamcall_core::{
    resolve, CallState, Cardinality, Code, Codec, CodecError, ConfigurationError,
    ConnectionError, Endpoint, EndpointConfig, Exchange, ExchangeRequest, JsonCodec, Metadata,
    MethodDescriptor, Outcome, Protocol, Status, StreamEvent, Transport, TransportError,
    TransportEvent,
};
