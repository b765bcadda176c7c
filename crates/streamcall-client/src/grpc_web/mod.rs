//! grpc-web transport
//!
//! Each call is one HTTP `POST` to `{endpoint}/{service}/{method}` whose body
//! is a single data frame. The response body carries data frames followed
//! by one trailer frame holding `grpc-status` and `grpc-message`.

pub mod frame;
mod transport;

pub use frame::{Frame, FrameDecoder};
pub use transport::{GrpcWebConfig, GrpcWebTransport};
