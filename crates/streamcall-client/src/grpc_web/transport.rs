//! grpc-web transport over reqwest

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use streamcall_core::{
    Code, Endpoint, Exchange, ExchangeRequest, Metadata, Protocol, Status, Transport,
    TransportError, TransportEvent,
};
use tracing::{debug, instrument, trace, warn};

use super::frame::{
    encode_frame, status_from_metadata, Frame, FrameDecoder, DEFAULT_MAX_FRAME_LEN, GRPC_MESSAGE,
    GRPC_STATUS,
};

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Marks the request as grpc-web for proxies
const X_GRPC_WEB: &str = "x-grpc-web";

/// grpc-web transport configuration
#[derive(Debug, Clone)]
pub struct GrpcWebConfig {
    /// Overall deadline per exchange; `None` lets streams run indefinitely
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
    /// Largest response frame accepted
    pub max_frame_len: usize,
}

impl Default for GrpcWebConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// grpc-web over HTTP/1.1 or HTTP/2
///
/// Connection pooling and TLS are left to the shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct GrpcWebTransport {
    client: Client,
    max_frame_len: usize,
}

impl GrpcWebTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(GrpcWebConfig::default())
    }

    pub fn with_config(config: GrpcWebConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            max_frame_len: config.max_frame_len,
        })
    }

    /// Use an existing HTTP client
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[async_trait]
impl Transport for GrpcWebTransport {
    fn protocol(&self) -> Protocol {
        Protocol::GrpcWeb
    }

    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        // Any HTTP answer means the server is reachable
        let response = self
            .client
            .head(endpoint.address().clone())
            .send()
            .await
            .map_err(transport_error)?;
        debug!(status = %response.status(), "Endpoint reachable");
        Ok(())
    }

    fn start(&self, request: ExchangeRequest) -> Exchange {
        let client = self.client.clone();
        let max_frame_len = self.max_frame_len;

        Box::pin(async_stream::stream! {
            let builder = match build_request(&client, &request) {
                Ok(builder) => builder,
                Err(e) => {
                    yield TransportEvent::Finished(e.into_status());
                    return;
                }
            };

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(method = %request.method, error = %e, "Request failed");
                    yield TransportEvent::Finished(transport_error(e).into_status());
                    return;
                }
            };

            let http_status = response.status();
            let mut headers = header_metadata(response.headers());
            trace!(method = %request.method, status = %http_status, "Response headers");

            // Trailers-only response: the status travels in the headers
            if let Some(status) = status_from_metadata(&headers) {
                if status.is_ok() {
                    headers.remove(GRPC_STATUS);
                    headers.remove(GRPC_MESSAGE);
                    yield TransportEvent::Accepted(headers);
                }
                yield TransportEvent::Finished(status);
                return;
            }

            if !http_status.is_success() {
                let code = Code::from_http_status(http_status.as_u16());
                yield TransportEvent::Finished(Status::new(code, format!("HTTP {}", http_status)));
                return;
            }

            yield TransportEvent::Accepted(headers);

            let mut body = response.bytes_stream();
            let mut decoder = FrameDecoder::with_max_frame_len(max_frame_len);

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(method = %request.method, error = %e, "Response body failed");
                        yield TransportEvent::Finished(transport_error(e).into_status());
                        return;
                    }
                };

                for frame in decoder.feed(chunk) {
                    match frame {
                        Ok(Frame::Data(payload)) => yield TransportEvent::Message(payload),
                        Ok(Frame::Trailers(trailers)) => {
                            let status = status_from_metadata(&trailers).unwrap_or_else(|| {
                                Status::internal("trailers without grpc-status")
                            });
                            yield TransportEvent::Finished(status);
                            return;
                        }
                        Err(e) => {
                            yield TransportEvent::Finished(e.into_status());
                            return;
                        }
                    }
                }
            }

            let reason = if decoder.has_partial() {
                "response body ended mid-frame"
            } else {
                "response body ended without trailers"
            };
            yield TransportEvent::Finished(TransportError::ProtocolError(reason.into()).into_status());
        })
    }
}

fn build_request(client: &Client, request: &ExchangeRequest) -> Result<RequestBuilder, TransportError> {
    let url = request.endpoint.method_url(&request.method);
    let content_type = HeaderValue::from_str(&request.content_type).map_err(|_| {
        TransportError::InvalidConfig(format!("Invalid content type: {}", request.content_type))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, content_type.clone());
    headers.insert(ACCEPT, content_type);
    headers.insert(X_GRPC_WEB, HeaderValue::from_static("1"));

    for (key, value) in request.metadata.iter() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError::InvalidConfig(format!("Invalid metadata key: {}", key)))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            TransportError::InvalidConfig(format!("Invalid metadata value for {}", key))
        })?;
        headers.insert(name, value);
    }

    debug!(%url, "Starting grpc-web exchange");
    Ok(client
        .post(url)
        .headers(headers)
        .body(encode_frame(&request.payload)))
}

fn header_metadata(headers: &HeaderMap) -> Metadata {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::ConnectionFailed(e.to_string())
    }
}
