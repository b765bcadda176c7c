//! Shared transport handle bound to one endpoint

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use streamcall_core::{
    Codec, CodecError, ConnectionError, Endpoint, ExchangeRequest, Metadata, MethodDescriptor,
    Protocol, Status, Transport,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::call::{self, CallShared};
use crate::grpc_web::{GrpcWebConfig, GrpcWebTransport};

/// Lets the channel fail a call without knowing its message type
pub(crate) trait CallControl: Send + Sync {
    fn close_with(&self, status: Status);
}

pub(crate) struct ChannelShared {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    /// Only written while holding `calls`
    closed: AtomicBool,
    calls: Mutex<HashMap<Uuid, Weak<dyn CallControl>>>,
}

impl ChannelShared {
    /// Track a live call; refused once the channel is closed
    fn register(&self, id: Uuid, call: Weak<dyn CallControl>) -> bool {
        let mut calls = self.calls.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        calls.insert(id, call);
        true
    }

    pub(crate) fn deregister(&self, id: &Uuid) {
        self.calls.lock().remove(id);
    }
}

/// Encoded request of one call
pub(crate) struct CallParams {
    pub content_type: String,
    pub payload: Result<Bytes, CodecError>,
    pub metadata: Metadata,
}

/// A reusable transport handle to one [`Endpoint`]
///
/// Cloning is cheap and every clone refers to the same channel. A channel
/// backs any number of concurrent calls; each call stays bound to the
/// channel it was opened on.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
}

impl Channel {
    /// Open a channel without probing the transport
    ///
    /// Connection failures surface as `UNAVAILABLE` on the first calls.
    pub fn open(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        debug!(%endpoint, protocol = %transport.protocol(), "Opening channel");
        Self {
            shared: Arc::new(ChannelShared {
                endpoint,
                transport,
                closed: AtomicBool::new(false),
                calls: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open a channel and wait until the transport reports it is reachable
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConnectionError> {
        transport
            .connect(&endpoint)
            .await
            .map_err(|source| ConnectionError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(Self::open(endpoint, transport))
    }

    /// Lazily connected grpc-web channel with default settings
    pub fn grpc_web(endpoint: Endpoint) -> Result<Self, ConnectionError> {
        Self::grpc_web_with_config(endpoint, GrpcWebConfig::default())
    }

    /// Lazily connected grpc-web channel
    pub fn grpc_web_with_config(
        endpoint: Endpoint,
        config: GrpcWebConfig,
    ) -> Result<Self, ConnectionError> {
        let transport = GrpcWebTransport::with_config(config)?;
        Ok(Self::open(endpoint, Arc::new(transport)))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn protocol(&self) -> Protocol {
        self.shared.transport.protocol()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of calls on this channel that have not finished
    pub fn active_calls(&self) -> usize {
        self.shared
            .calls
            .lock()
            .values()
            .filter(|call| call.strong_count() > 0)
            .count()
    }

    /// Close the channel
    ///
    /// Every live call is failed with `Status(UNAVAILABLE)` before this
    /// returns. Subscribers see that status before this returns unless
    /// another thread is dispatching for the call at the time; that
    /// dispatcher then delivers it right after its current event. Calls
    /// invoked afterwards fail the same way. Idempotent.
    pub fn close(&self) {
        let calls: Vec<_> = {
            let mut calls = self.shared.calls.lock();
            if self.shared.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            calls.drain().map(|(_, call)| call).collect()
        };

        info!(endpoint = %self.shared.endpoint, calls = calls.len(), "Closing channel");

        for call in calls.iter().filter_map(Weak::upgrade) {
            call.close_with(Status::unavailable("channel closed"));
        }
    }

    /// Create call state bound to this channel, not yet started
    pub(crate) fn new_call<M>(&self, method: MethodDescriptor) -> Arc<CallShared<M>> {
        Arc::new(CallShared::new(Uuid::new_v4(), method, self.shared.clone()))
    }

    /// Open the call's exchange and spawn its driver
    ///
    /// Subscribers registered on `call` before this point observe every
    /// event of the call.
    pub(crate) fn launch<C: Codec>(
        &self,
        call: &Arc<CallShared<C::Decode>>,
        params: CallParams,
        codec: Arc<C>,
    ) {
        let id = call.id();
        let control: Weak<dyn CallControl> = Arc::downgrade(call) as Weak<dyn CallControl>;
        let failure = if !self.shared.register(id, control) {
            Some(Status::unavailable("channel closed"))
        } else {
            match params.payload {
                Ok(payload) => {
                    let exchange = self.shared.transport.start(ExchangeRequest {
                        endpoint: self.shared.endpoint.clone(),
                        method: call.method().clone(),
                        content_type: params.content_type,
                        payload,
                        metadata: params.metadata,
                    });
                    call.install_exchange(exchange);
                    None
                }
                Err(e) => Some(Status::internal(e.to_string())),
            }
        };

        debug!(call = %id, method = %call.method(), endpoint = %self.shared.endpoint, "Invoking");

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let driver = runtime.spawn(call::drive(call.clone(), codec, failure));
                call.install_driver(driver.abort_handle());
            }
            Err(_) => {
                warn!(call = %id, "No tokio runtime to drive the call");
                call.release_exchange();
                call.fail(failure.unwrap_or_else(|| {
                    Status::internal("no async runtime available to drive the call")
                }));
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.shared.endpoint.to_string())
            .field("protocol", &self.protocol())
            .field("closed", &self.is_closed())
            .finish()
    }
}
