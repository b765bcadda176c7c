//! Message codecs
//!
//! Message schemas and their encoding come from code generation outside
//! this workspace. The call stack only needs to turn a typed request into
//! payload bytes and payload bytes back into a typed response.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Content type used by [`JsonCodec`]
pub const JSON_CONTENT_TYPE: &str = "application/grpc-web+json";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

/// Encodes requests and decodes responses for one method
pub trait Codec: Send + Sync + 'static {
    /// Request message type
    type Encode: Send + 'static;
    /// Response message type
    type Decode: Send + 'static;

    /// Content type announced to the server
    fn content_type(&self) -> &str;

    fn encode(&self, item: &Self::Encode) -> Result<Bytes, CodecError>;

    fn decode(&self, buf: Bytes) -> Result<Self::Decode, CodecError>;
}

/// serde_json codec
pub struct JsonCodec<Req, Resp> {
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> JsonCodec<Req, Resp> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> Default for JsonCodec<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Clone for JsonCodec<Req, Resp> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<Req, Resp> fmt::Debug for JsonCodec<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<Req, Resp> Codec for JsonCodec<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    type Encode = Req;
    type Decode = Resp;

    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, item: &Req) -> Result<Bytes, CodecError> {
        serde_json::to_vec(item)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, buf: Bytes) -> Result<Resp, CodecError> {
        serde_json::from_slice(&buf).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
