//! Streaming call lifecycle
//!
//! A [`StreamingCall`] is one in-flight invocation. It owns the call's state
//! machine and subscriber set; a driver task spawned at invoke time feeds it
//! the transport's events.

mod shared;
mod stream;

pub use stream::EventStream;

pub(crate) use shared::CallShared;

use std::fmt;
use std::sync::Arc;

use streamcall_core::{
    CallState, Codec, Metadata, MethodDescriptor, Outcome, Status, StreamEvent, TransportEvent,
};
use tracing::warn;
use uuid::Uuid;

/// Identifies one subscription on a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub(crate) u64);

/// Handle to one in-flight streaming call
///
/// Cheap to clone; all clones refer to the same call.
///
/// # Delivery
///
/// - subscribers receive events in transport order, in subscription order
///   among themselves
/// - a new subscriber sees no past `Data`, only what follows plus the
///   terminal event (replayed once if the call already finished)
/// - exactly one terminal event per call, nothing after it
///
/// Dropping every handle does not cancel the call; call [`cancel`](Self::cancel)
/// or let it finish.
pub struct StreamingCall<M> {
    shared: Arc<CallShared<M>>,
}

impl<M> Clone for StreamingCall<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M> StreamingCall<M> {
    pub(crate) fn new(shared: Arc<CallShared<M>>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<CallShared<M>> {
        &self.shared
    }

    /// Unique call identifier (used in logs)
    pub fn id(&self) -> Uuid {
        self.shared.id()
    }

    pub fn method(&self) -> &MethodDescriptor {
        self.shared.method()
    }

    pub fn state(&self) -> CallState {
        self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The terminal event, once the call finished
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.outcome()
    }

    /// Response headers sent by the server when it accepted the call
    pub fn headers(&self) -> Option<Metadata> {
        self.shared.headers()
    }

    /// Register a callback for this call's events
    ///
    /// Safe to call from inside another callback of the same call.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StreamEvent<M>) + Send + Sync + 'static,
    {
        SubscriptionToken(self.shared.subscribe(Arc::new(callback)))
    }

    /// Remove a callback; returns false if it was not registered
    ///
    /// Takes effect immediately, even for an event being dispatched.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.shared.unsubscribe(token.0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }

    /// Cancel the call
    ///
    /// Stops data delivery, aborts the exchange at the transport and
    /// delivers a single `Status(CANCELLED)`. Idempotent: a no-op once the
    /// call finished. Returns whether this call to `cancel` ended the call.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Wait for the terminal event
    pub async fn finished(&self) -> Outcome {
        self.shared.finished().await
    }

    /// Wait for the call to finish and collapse the outcome into a status
    pub async fn status(&self) -> Status {
        self.finished().await.into_status()
    }
}

impl<M: Clone + Send + 'static> StreamingCall<M> {
    /// Consume events as a [`futures::Stream`]
    ///
    /// Subscribes now; events dispatched before this call are not replayed.
    pub fn events(&self) -> EventStream<M> {
        EventStream::subscribe(self)
    }
}

impl<M> fmt::Debug for StreamingCall<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingCall")
            .field("id", &self.id())
            .field("method", &self.method().to_string())
            .field("state", &self.state())
            .finish()
    }
}

/// Feed one call from its transport exchange until it finishes
///
/// `failure` is set when the call must fail before any exchange could be
/// opened (closed channel, request encoding error).
pub(crate) async fn drive<C: Codec>(
    call: Arc<CallShared<C::Decode>>,
    codec: Arc<C>,
    failure: Option<Status>,
) {
    if let Some(status) = failure {
        call.fail(status);
        return;
    }

    loop {
        let event = futures::future::poll_fn(|cx| call.poll_exchange(cx)).await;
        match event {
            Some(TransportEvent::Accepted(headers)) => call.accept(headers),
            Some(TransportEvent::Message(payload)) => match codec.decode(payload) {
                Ok(message) => call.push_data(message),
                Err(e) => {
                    warn!(call = %call.id(), error = %e, "Failed to decode response");
                    call.fail(Status::internal(e.to_string()));
                    return;
                }
            },
            Some(TransportEvent::Finished(status)) => {
                call.release_exchange();
                call.finish(status);
                return;
            }
            None => {
                if !call.state().is_terminal() {
                    warn!(call = %call.id(), "Exchange ended without a status");
                    call.fail(Status::internal("exchange ended without status"));
                }
                return;
            }
        }
    }
}
