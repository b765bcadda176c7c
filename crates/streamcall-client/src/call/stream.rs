//! `Stream` adapter over a call subscription

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use streamcall_core::StreamEvent;
use tokio::sync::mpsc;

use super::{StreamingCall, SubscriptionToken};

/// A call's events as a [`Stream`]
///
/// Yields `Data` events followed by the terminal event, then `None`.
/// Dropping the stream unsubscribes; it does not cancel the call.
///
/// # Example
///
/// ```ignore
/// let mut events = call.events();
///
/// while let Some(event) = events.next().await {
///     println!("{:?}", event);
/// }
/// ```
pub struct EventStream<M> {
    call: StreamingCall<M>,
    token: SubscriptionToken,
    rx: mpsc::UnboundedReceiver<StreamEvent<M>>,
    finished: bool,
}

impl<M: Clone + Send + 'static> EventStream<M> {
    pub(crate) fn subscribe(call: &StreamingCall<M>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = call.subscribe(move |event: &StreamEvent<M>| {
            let _ = tx.send(event.clone());
        });
        Self {
            call: call.clone(),
            token,
            rx,
            finished: false,
        }
    }
}

impl<M> EventStream<M> {
    /// The call this stream observes
    pub fn call(&self) -> &StreamingCall<M> {
        &self.call
    }

    /// Get the next event
    ///
    /// Returns `None` after the terminal event.
    pub async fn next(&mut self) -> Option<StreamEvent<M>> {
        <Self as StreamExt>::next(self).await
    }
}

impl<M> Stream for EventStream<M> {
    type Item = StreamEvent<M>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                    this.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<M> Drop for EventStream<M> {
    fn drop(&mut self) {
        self.call.unsubscribe(self.token);
    }
}
