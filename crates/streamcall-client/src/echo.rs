//! Echo service client
//!
//! Typed client for the `echo.EchoController` service: a server-streaming
//! `Echo` method that sends the request message back `repeat` times, and a
//! unary `Say` method answering once.

use serde::{Deserialize, Serialize};
use streamcall_core::{
    resolve, ConfigurationError, EndpointConfig, JsonCodec, Metadata, MethodDescriptor, Status,
};

use crate::call::{EventStream, StreamingCall};
use crate::channel::Channel;
use crate::stub::ClientStub;

/// Fully qualified service name
pub const ECHO_SERVICE: &str = "echo.EchoController";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
    /// How many times the server echoes the message (server default: once)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
}

impl EchoRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            repeat: None,
        }
    }

    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = Some(repeat);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub message: String,
}

type EchoStub = ClientStub<JsonCodec<EchoRequest, EchoResponse>>;

/// Echo service client
#[derive(Debug, Clone)]
pub struct EchoClient {
    echo: EchoStub,
    say: EchoStub,
}

impl EchoClient {
    /// Bind the echo methods to an existing channel
    pub fn new(channel: &Channel) -> Result<Self, ConfigurationError> {
        let protocol = channel.protocol();
        Ok(Self {
            echo: ClientStub::bind_json(
                channel,
                MethodDescriptor::server_streaming(ECHO_SERVICE, "Echo").with_protocol(protocol),
            )?,
            say: ClientStub::bind_json(
                channel,
                MethodDescriptor::unary(ECHO_SERVICE, "Say").with_protocol(protocol),
            )?,
        })
    }

    /// Resolve `address` and open a lazily connected grpc-web channel to it
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = EchoClient::connect("http://localhost:8080")?;
    /// ```
    pub fn connect(address: &str) -> crate::Result<Self> {
        let endpoint = resolve(&EndpointConfig::new(address))?;
        let channel = Channel::grpc_web(endpoint)?;
        Ok(Self::new(&channel)?)
    }

    /// Start a server-streaming `Echo` call
    pub fn echo(&self, request: &EchoRequest) -> StreamingCall<EchoResponse> {
        self.echo.invoke(request)
    }

    pub fn echo_with_metadata(
        &self,
        request: &EchoRequest,
        metadata: Metadata,
    ) -> StreamingCall<EchoResponse> {
        self.echo.invoke_with_metadata(request, metadata)
    }

    /// Start an `Echo` call and consume it as a stream of events
    pub fn echo_stream(&self, request: &EchoRequest) -> EventStream<EchoResponse> {
        self.echo.stream(request)
    }

    /// Unary `Say` call
    pub async fn say(&self, request: &EchoRequest) -> Result<EchoResponse, Status> {
        self.say.unary(request).await
    }

    pub fn channel(&self) -> &Channel {
        self.echo.channel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_unset_repeat() {
        let json = serde_json::to_string(&EchoRequest::new("hi")).unwrap();
        assert_eq!(json, r#"{"message":"hi"}"#);

        let json = serde_json::to_string(&EchoRequest::new("hi").with_repeat(3)).unwrap();
        assert_eq!(json, r#"{"message":"hi","repeat":3}"#);
    }

    #[test]
    fn test_request_repeat_defaults_when_missing() {
        let request: EchoRequest = serde_json::from_str(r#"{"message":"x"}"#).unwrap();
        assert_eq!(request.repeat, None);
    }
}
