//! Call state machine and event dispatch
//!
//! All transitions happen under the `inner` lock; callbacks always run with
//! no lock held. Events go through a FIFO queue drained by at most one
//! dispatcher at a time, which keeps delivery ordered and non-overlapping
//! and lets callbacks re-enter the call (subscribe, unsubscribe, cancel).

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use parking_lot::Mutex;
use streamcall_core::{
    CallState, Exchange, Metadata, MethodDescriptor, Outcome, Status, StreamEvent, TransportEvent,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::channel::{CallControl, ChannelShared};

pub(crate) type Callback<M> = Arc<dyn Fn(&StreamEvent<M>) + Send + Sync>;

enum Delivery<M> {
    /// To every subscriber registered when the event is taken off the queue
    Broadcast(StreamEvent<M>),
    /// Terminal event for a subscriber that arrived after it was broadcast
    Replay(u64, StreamEvent<M>),
}

/// What a terminal transition does with data not yet dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flush {
    /// Deliver queued data before the terminal event
    Keep,
    /// Drop queued data and stop any data dispatch in progress
    Discard,
}

struct CallInner<M> {
    state: CallState,
    /// Insertion order is delivery order
    subscribers: Vec<(u64, Callback<M>)>,
    next_token: u64,
    queue: VecDeque<Delivery<M>>,
    dispatching: bool,
    terminal_broadcast: bool,
    halted: bool,
    outcome: Option<Outcome>,
    headers: Option<Metadata>,
    received: usize,
    driver: Option<AbortHandle>,
}

pub(crate) struct CallShared<M> {
    id: Uuid,
    method: MethodDescriptor,
    channel: Arc<ChannelShared>,
    inner: Mutex<CallInner<M>>,
    exchange: Mutex<Option<Exchange>>,
    outcome_tx: watch::Sender<Option<Outcome>>,
}

impl<M> CallShared<M> {
    pub(crate) fn new(id: Uuid, method: MethodDescriptor, channel: Arc<ChannelShared>) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            id,
            method,
            channel,
            inner: Mutex::new(CallInner {
                state: CallState::Opening,
                subscribers: Vec::new(),
                next_token: 0,
                queue: VecDeque::new(),
                dispatching: false,
                terminal_broadcast: false,
                halted: false,
                outcome: None,
                headers: None,
                received: 0,
                driver: None,
            }),
            exchange: Mutex::new(None),
            outcome_tx,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub(crate) fn state(&self) -> CallState {
        self.inner.lock().state
    }

    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.inner.lock().outcome.clone()
    }

    pub(crate) fn headers(&self) -> Option<Metadata> {
        self.inner.lock().headers.clone()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    // =========================================================================
    // Transport side
    // =========================================================================

    /// Store the exchange the driver will poll
    ///
    /// A call that already finished (closed while the transport was starting
    /// the exchange) drops it instead. Holding `inner` orders this against
    /// `terminate`, which releases the slot only after setting the state.
    pub(crate) fn install_exchange(&self, exchange: Exchange) {
        let inner = self.inner.lock();
        if inner.state.is_terminal() {
            drop(inner);
            debug!(call = %self.id, "Dropping exchange of finished call");
            drop(exchange);
            return;
        }
        *self.exchange.lock() = Some(exchange);
    }

    pub(crate) fn install_driver(&self, driver: AbortHandle) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            drop(inner);
            driver.abort();
        } else {
            inner.driver = Some(driver);
        }
    }

    /// Poll the open exchange; `None` once it ended or was released
    pub(crate) fn poll_exchange(&self, cx: &mut Context<'_>) -> Poll<Option<TransportEvent>> {
        match self.exchange.lock().as_mut() {
            Some(exchange) => exchange.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }

    /// Drop the exchange, aborting it at the transport
    pub(crate) fn release_exchange(&self) -> bool {
        let exchange = self.exchange.lock().take();
        let released = exchange.is_some();
        drop(exchange);
        released
    }

    pub(crate) fn accept(&self, headers: Metadata) {
        let mut inner = self.inner.lock();
        if inner.state == CallState::Opening {
            debug!(call = %self.id, method = %self.method, "Call accepted");
            inner.state = CallState::Streaming;
            inner.headers = Some(headers);
        }
    }

    pub(crate) fn push_data(&self, message: M) {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                CallState::Opening => {
                    debug!(call = %self.id, "First message implies acceptance");
                    inner.state = CallState::Streaming;
                }
                CallState::Streaming => {}
                _ => {
                    trace!(call = %self.id, state = %inner.state, "Ignoring message for finished call");
                    return;
                }
            }

            if self.method.is_unary() && inner.received > 0 {
                drop(inner);
                self.fail(Status::internal("unary call received more than one response"));
                return;
            }

            inner.received += 1;
            trace!(call = %self.id, seq = inner.received, "Queueing message");
            inner.queue.push_back(Delivery::Broadcast(StreamEvent::Data(message)));
        }
        self.pump();
    }

    /// The transport reported the end of the exchange
    pub(crate) fn finish(&self, status: Status) {
        if !status.is_ok() {
            self.terminate(Outcome::Status(status), CallState::Failed, Flush::Keep);
            return;
        }

        let empty_unary = self.method.is_unary() && self.inner.lock().received == 0;
        if empty_unary {
            self.fail(Status::internal("unary call completed without a response"));
        } else {
            self.terminate(Outcome::End, CallState::Completed, Flush::Keep);
        }
    }

    pub(crate) fn fail(&self, status: Status) {
        self.terminate(Outcome::Status(status), CallState::Failed, Flush::Keep);
    }

    // =========================================================================
    // Owner side
    // =========================================================================

    pub(crate) fn cancel(&self) -> bool {
        self.terminate(
            Outcome::Status(Status::cancelled()),
            CallState::Cancelled,
            Flush::Discard,
        )
    }

    pub(crate) fn subscribe(&self, callback: Callback<M>) -> u64 {
        let token = {
            let mut inner = self.inner.lock();
            let token = inner.next_token;
            inner.next_token += 1;
            inner.subscribers.push((token, callback));

            if inner.terminal_broadcast {
                if let Some(outcome) = inner.outcome.clone() {
                    inner.queue.push_back(Delivery::Replay(token, outcome.into()));
                }
            }
            token
        };
        self.pump();
        token
    }

    pub(crate) fn unsubscribe(&self, token: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(t, _)| *t != token);
        inner.subscribers.len() != before
    }

    pub(crate) async fn finished(&self) -> Outcome {
        let mut rx = self.outcome_tx.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| (*outcome).clone());
        outcome.unwrap_or_else(|| Outcome::Status(Status::internal("call dropped before completion")))
    }

    // =========================================================================
    // Transitions and dispatch
    // =========================================================================

    /// Enter a terminal state; returns false if the call already finished
    fn terminate(&self, outcome: Outcome, state: CallState, flush: Flush) -> bool {
        let driver = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                trace!(call = %self.id, state = %inner.state, "Call already finished");
                return false;
            }

            debug!(call = %self.id, from = %inner.state, to = %state, "Call finished");
            inner.state = state;

            if flush == Flush::Discard {
                inner.halted = true;
                let dropped = inner.queue.len();
                inner.queue.clear();
                if dropped > 0 {
                    debug!(call = %self.id, dropped, "Discarded undelivered messages");
                }
            }

            inner.outcome = Some(outcome.clone());
            inner.queue.push_back(Delivery::Broadcast(outcome.into()));
            inner.driver.take()
        };

        // Quiesce before anyone can observe the terminal event
        self.release_exchange();
        if let Some(driver) = driver {
            driver.abort();
        }
        self.channel.deregister(&self.id);

        self.pump();
        true
    }

    /// Drain the queue unless another dispatcher is already doing so
    fn pump(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            let (event, targets, completes) = {
                let mut inner = self.inner.lock();
                let Some(delivery) = inner.queue.pop_front() else {
                    inner.dispatching = false;
                    return;
                };

                match delivery {
                    Delivery::Broadcast(event) => {
                        let completes = event.is_terminal();
                        if completes {
                            inner.terminal_broadcast = true;
                        }
                        (event, inner.subscribers.clone(), completes)
                    }
                    Delivery::Replay(token, event) => {
                        let targets = inner
                            .subscribers
                            .iter()
                            .filter(|(t, _)| *t == token)
                            .cloned()
                            .collect();
                        (event, targets, false)
                    }
                }
            };

            for (token, callback) in targets {
                if !self.should_deliver(token, &event) {
                    continue;
                }
                callback(&event);
            }

            // Waiters resume only once every subscriber saw the terminal event
            if completes {
                self.outcome_tx.send_replace(self.outcome());
            }
        }
    }

    /// Re-checked per subscriber: earlier callbacks may have unsubscribed
    /// this one or cancelled the call
    fn should_deliver(&self, token: u64, event: &StreamEvent<M>) -> bool {
        let inner = self.inner.lock();
        if inner.halted && !event.is_terminal() {
            return false;
        }
        inner.subscribers.iter().any(|(t, _)| *t == token)
    }
}

impl<M: Send + 'static> CallControl for CallShared<M> {
    fn close_with(&self, status: Status) {
        self.terminate(Outcome::Status(status), CallState::Failed, Flush::Discard);
    }
}
