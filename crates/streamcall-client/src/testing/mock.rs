//! Scriptable in-memory transport

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use streamcall_core::{
    Endpoint, Exchange, ExchangeRequest, Metadata, Protocol, Status, Transport, TransportError,
    TransportEvent,
};
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// How long [`MockTransport::next_exchange`] waits for a call to start
const EXCHANGE_WAIT: Duration = Duration::from_secs(5);

/// Mock transport for testing
///
/// Every started exchange is handed to the test as an [`ExchangeController`]
/// that plays the server side. Optionally each exchange is pre-loaded with a
/// script of events.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(MockTransport::new());
/// let channel = Channel::open(endpoint, transport.clone());
/// let call = stub.invoke(&request);
///
/// let exchange = transport.next_exchange().await.unwrap();
/// exchange.accept();
/// exchange.send_json(&response);
/// exchange.end();
/// ```
pub struct MockTransport {
    protocol: Protocol,
    script: RwLock<Option<Vec<TransportEvent>>>,
    connect_error: RwLock<Option<TransportError>>,
    started: AtomicUsize,
    exchanges_tx: mpsc::UnboundedSender<ExchangeController>,
    exchanges_rx: Mutex<mpsc::UnboundedReceiver<ExchangeController>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_protocol(Protocol::GrpcWeb)
    }

    pub fn with_protocol(protocol: Protocol) -> Self {
        let (exchanges_tx, exchanges_rx) = mpsc::unbounded_channel();
        Self {
            protocol,
            script: RwLock::new(None),
            connect_error: RwLock::new(None),
            started: AtomicUsize::new(0),
            exchanges_tx,
            exchanges_rx: Mutex::new(exchanges_rx),
        }
    }

    /// Transport whose exchanges all replay `events`
    pub fn scripted(events: Vec<TransportEvent>) -> Self {
        let transport = Self::new();
        transport.set_script(events);
        transport
    }

    /// Replay `events` on every exchange started from now on
    pub fn set_script(&self, events: Vec<TransportEvent>) {
        *self.script.write() = Some(events);
    }

    /// Make [`Transport::connect`] fail with `error`
    pub fn fail_connect(&self, error: TransportError) {
        *self.connect_error.write() = Some(error);
    }

    /// Number of exchanges started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait for the next exchange to start
    ///
    /// Returns `None` if none starts within a few seconds.
    pub async fn next_exchange(&self) -> Option<ExchangeController> {
        let mut rx = self.exchanges_rx.lock().await;
        tokio::time::timeout(EXCHANGE_WAIT, rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Take an already started exchange without waiting
    pub fn try_next_exchange(&self) -> Option<ExchangeController> {
        self.exchanges_rx.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn connect(&self, _endpoint: &Endpoint) -> Result<(), TransportError> {
        match self.connect_error.read().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn start(&self, request: ExchangeRequest) -> Exchange {
        let seq = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(seq, method = %request.method, "Mock exchange started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(script) = self.script.read().as_ref() {
            for event in script {
                let _ = tx.send(event.clone());
            }
        }

        let _ = self.exchanges_tx.send(ExchangeController { request, tx });

        Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }
}

/// Server side of one mock exchange
///
/// Events are delivered to the call in the order they are sent. Dropping
/// the controller without finishing ends the exchange without a status.
pub struct ExchangeController {
    request: ExchangeRequest,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ExchangeController {
    /// The request the call sent
    pub fn request(&self) -> &ExchangeRequest {
        &self.request
    }

    /// Decode the request payload as JSON
    pub fn request_json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.request.payload)
    }

    pub fn accept(&self) -> bool {
        self.accept_with(Metadata::new())
    }

    pub fn accept_with(&self, headers: Metadata) -> bool {
        self.push(TransportEvent::Accepted(headers))
    }

    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.push(TransportEvent::Message(payload.into()))
    }

    pub fn send_json<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_vec(message) {
            Ok(payload) => self.send(payload),
            Err(_) => false,
        }
    }

    pub fn finish(&self, status: Status) -> bool {
        self.push(TransportEvent::Finished(status))
    }

    /// Finish with `OK`
    pub fn end(&self) -> bool {
        self.finish(Status::ok())
    }

    /// Drop the server side without a status
    pub fn close(self) {}

    /// Whether the call side dropped the exchange
    pub fn is_released(&self) -> bool {
        self.tx.is_closed()
    }

    /// Returns false once the call side dropped the exchange
    fn push(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl std::fmt::Debug for ExchangeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeController")
            .field("method", &self.request.method.to_string())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use streamcall_core::{resolve, EndpointConfig, MethodDescriptor};

    fn request() -> ExchangeRequest {
        ExchangeRequest {
            endpoint: resolve(&EndpointConfig::new("http://localhost:8080")).unwrap(),
            method: MethodDescriptor::server_streaming("echo.EchoController", "Echo"),
            content_type: "application/grpc-web+json".into(),
            payload: Bytes::from_static(br#"{"message":"hi"}"#),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_controller_feeds_exchange() {
        let transport = MockTransport::new();
        let mut exchange = transport.start(request());
        let controller = transport.next_exchange().await.unwrap();

        assert_eq!(transport.started(), 1);
        assert_eq!(
            controller.request_json::<serde_json::Value>().unwrap()["message"],
            "hi"
        );

        controller.accept();
        controller.send(Bytes::from_static(b"x"));
        controller.end();

        assert!(matches!(exchange.next().await, Some(TransportEvent::Accepted(_))));
        assert_eq!(
            exchange.next().await,
            Some(TransportEvent::Message(Bytes::from_static(b"x")))
        );
        assert_eq!(exchange.next().await, Some(TransportEvent::Finished(Status::ok())));

        assert!(!controller.is_released());
        drop(exchange);
        assert!(controller.is_released());
    }

    #[tokio::test]
    async fn test_scripted_exchange() {
        let transport = MockTransport::scripted(vec![TransportEvent::Finished(
            Status::unavailable("down"),
        )]);
        let events: Vec<_> = transport.start(request()).take(1).collect().await;
        assert_eq!(events, vec![TransportEvent::Finished(Status::unavailable("down"))]);
    }

    #[tokio::test]
    async fn test_fail_connect() {
        let transport = MockTransport::new();
        let endpoint = request().endpoint;
        assert!(transport.connect(&endpoint).await.is_ok());

        transport.fail_connect(TransportError::ConnectionClosed);
        assert_eq!(
            transport.connect(&endpoint).await,
            Err(TransportError::ConnectionClosed)
        );
    }
}
