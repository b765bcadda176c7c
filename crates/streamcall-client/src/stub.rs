//! Typed proxy binding one method to a channel

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use streamcall_core::{
    Codec, ConfigurationError, JsonCodec, Metadata, MethodDescriptor, Status, StreamEvent,
};
use tracing::instrument;

use crate::call::{EventStream, StreamingCall, SubscriptionToken};
use crate::channel::{CallParams, Channel};

/// Typed client for one method
///
/// Holds nothing but the channel, the method descriptor and its codec, so
/// it can be cloned and shared freely.
pub struct ClientStub<C: Codec> {
    channel: Channel,
    method: MethodDescriptor,
    codec: Arc<C>,
}

impl<C: Codec> Clone for ClientStub<C> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            method: self.method.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<Req, Resp> ClientStub<JsonCodec<Req, Resp>>
where
    Req: Serialize + Send + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    /// Bind a method whose messages are JSON-encoded
    pub fn bind_json(channel: &Channel, method: MethodDescriptor) -> Result<Self, ConfigurationError> {
        Self::bind(channel, method, JsonCodec::new())
    }
}

impl<C: Codec> ClientStub<C> {
    /// Bind a method descriptor to a channel
    ///
    /// Fails if the descriptor is malformed or targets a different protocol
    /// family than the channel's transport.
    pub fn bind(
        channel: &Channel,
        method: MethodDescriptor,
        codec: C,
    ) -> Result<Self, ConfigurationError> {
        method.validate()?;

        if method.protocol != channel.protocol() {
            return Err(ConfigurationError::ProtocolMismatch {
                method: method.to_string(),
                method_protocol: method.protocol,
                channel_protocol: channel.protocol(),
            });
        }

        Ok(Self {
            channel: channel.clone(),
            method,
            codec: Arc::new(codec),
        })
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Start a call
    ///
    /// Never blocks and never fails: the call is returned in `Opening` and
    /// every runtime failure arrives as its terminal `Status` event. Must be
    /// called from within a tokio runtime; outside one the call is returned
    /// already `Failed` with `INTERNAL`.
    pub fn invoke(&self, request: &C::Encode) -> StreamingCall<C::Decode> {
        self.invoke_with_metadata(request, Metadata::new())
    }

    /// Start a call with request metadata
    pub fn invoke_with_metadata(
        &self,
        request: &C::Encode,
        metadata: Metadata,
    ) -> StreamingCall<C::Decode> {
        let call = self.channel.new_call(self.method.clone());
        self.channel
            .launch(&call, self.params(request, metadata), self.codec.clone());
        StreamingCall::new(call)
    }

    /// Start a call with a subscriber registered before the exchange starts
    ///
    /// The subscriber observes every event of the call, whatever the
    /// runtime's scheduling. Events are delivered from the call's driver
    /// task, except outside a tokio runtime: the call then fails on the spot
    /// and `callback` receives the `INTERNAL` status before this returns.
    pub fn invoke_subscribed<F>(
        &self,
        request: &C::Encode,
        metadata: Metadata,
        callback: F,
    ) -> (StreamingCall<C::Decode>, SubscriptionToken)
    where
        F: Fn(&StreamEvent<C::Decode>) + Send + Sync + 'static,
    {
        let call = StreamingCall::new(self.channel.new_call(self.method.clone()));
        let token = call.subscribe(callback);
        self.channel
            .launch(call.shared(), self.params(request, metadata), self.codec.clone());
        (call, token)
    }

    fn params(&self, request: &C::Encode, metadata: Metadata) -> CallParams {
        CallParams {
            content_type: self.codec.content_type().to_string(),
            payload: self.codec.encode(request),
            metadata,
        }
    }
}

impl<C> ClientStub<C>
where
    C: Codec,
    C::Decode: Clone,
{
    /// Start a call and consume its events as a stream
    ///
    /// The stream is subscribed before the exchange starts, so it sees
    /// every event.
    pub fn stream(&self, request: &C::Encode) -> EventStream<C::Decode> {
        self.stream_with_metadata(request, Metadata::new())
    }

    pub fn stream_with_metadata(
        &self,
        request: &C::Encode,
        metadata: Metadata,
    ) -> EventStream<C::Decode> {
        let call = StreamingCall::new(self.channel.new_call(self.method.clone()));
        let events = call.events();
        self.channel
            .launch(call.shared(), self.params(request, metadata), self.codec.clone());
        events
    }

    /// Call the method and wait for its single response
    ///
    /// On a server-streaming method the first message is returned and the
    /// rest of the call is cancelled. Dropping the future cancels the call.
    #[instrument(skip_all, fields(method = %self.method))]
    pub async fn unary(&self, request: &C::Encode) -> Result<C::Decode, Status> {
        let mut events = self.stream(request);
        let _guard = CancelOnDrop(events.call().clone());

        let mut response = None;
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Data(message) => {
                    if !self.method.is_unary() {
                        return Ok(message);
                    }
                    response = Some(message);
                }
                StreamEvent::Status(status) => return Err(status),
                StreamEvent::End => break,
            }
        }

        response.ok_or_else(|| Status::internal("call ended without a response"))
    }
}

impl<C: Codec> fmt::Debug for ClientStub<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStub")
            .field("method", &self.method.to_string())
            .field("channel", &self.channel)
            .finish()
    }
}

/// Cancels a call when dropped; a no-op if the call already finished
struct CancelOnDrop<M>(StreamingCall<M>);

impl<M> Drop for CancelOnDrop<M> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
