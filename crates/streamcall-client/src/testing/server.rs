//! In-process grpc-web echo server

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::BytesMut;
use streamcall_core::codec::JSON_CONTENT_TYPE;
use streamcall_core::{resolve, Code, Endpoint, EndpointConfig, Status};
use tokio::net::TcpListener;
use tracing::debug;

use crate::channel::Channel;
use crate::echo::{EchoClient, EchoRequest, EchoResponse, ECHO_SERVICE};
use crate::grpc_web::frame::{
    encode_frame, encode_grpc_message, encode_trailers, Frame, FrameDecoder, GRPC_MESSAGE,
    GRPC_STATUS,
};
use crate::Result;

/// Delay between messages of the `Ticks` method
pub const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Message of the status returned by the `Fail` method
pub const FAIL_MESSAGE: &str = "echo backend 100% unavailable";

/// Echo server on an ephemeral port that shuts down when dropped
///
/// Serves `echo.EchoController` at the root and under `/api`:
/// - `Echo` answers the request message `repeat` times (default once)
/// - `Say` answers once
/// - `Fail` rejects with a trailers-only `UNAVAILABLE`
/// - `Ticks` streams `tick N` every 20ms, `repeat` times (default 1000)
pub struct EchoServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl EchoServer {
    pub async fn start() -> Result<Self> {
        Self::serve(echo_router()).await
    }

    /// Serve an arbitrary router
    pub async fn serve(router: Router) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        debug!(%addr, "Echo server listening");

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Ok(resolve(&EndpointConfig::new(self.base_url()))?)
    }

    /// Fresh grpc-web channel to this server
    pub fn channel(&self) -> Result<Channel> {
        Ok(Channel::grpc_web(self.endpoint()?)?)
    }

    pub fn client(&self) -> Result<EchoClient> {
        Ok(EchoClient::new(&self.channel()?)?)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// grpc-web routes of the echo service
pub fn echo_router() -> Router {
    let routes = || {
        Router::new()
            .route(&format!("/{}/Echo", ECHO_SERVICE), post(echo))
            .route(&format!("/{}/Say", ECHO_SERVICE), post(say))
            .route(&format!("/{}/Fail", ECHO_SERVICE), post(fail))
            .route(&format!("/{}/Ticks", ECHO_SERVICE), post(ticks))
    };
    routes().nest("/api", routes())
}

async fn echo(body: Bytes) -> Response {
    let request = match decode_request(body) {
        Ok(request) => request,
        Err(status) => return trailers_only(&status),
    };

    let mut out = BytesMut::new();
    for _ in 0..request.repeat.unwrap_or(1) {
        match message_frame(&request.message) {
            Ok(frame) => out.extend_from_slice(&frame),
            Err(status) => return trailers_only(&status),
        }
    }
    out.extend_from_slice(&encode_trailers(&Status::ok()));
    grpc_web_response(Body::from(out.freeze()))
}

async fn say(body: Bytes) -> Response {
    let request = match decode_request(body) {
        Ok(request) => request,
        Err(status) => return trailers_only(&status),
    };

    let mut out = BytesMut::new();
    match message_frame(&request.message) {
        Ok(frame) => out.extend_from_slice(&frame),
        Err(status) => return trailers_only(&status),
    }
    out.extend_from_slice(&encode_trailers(&Status::ok()));
    grpc_web_response(Body::from(out.freeze()))
}

async fn fail() -> Response {
    trailers_only(&Status::unavailable(FAIL_MESSAGE))
}

async fn ticks(body: Bytes) -> Response {
    let request = match decode_request(body) {
        Ok(request) => request,
        Err(status) => return trailers_only(&status),
    };
    let count = request.repeat.unwrap_or(1000);

    let stream = async_stream::stream! {
        for n in 1..=count {
            tokio::time::sleep(TICK_INTERVAL).await;
            match message_frame(&format!("tick {}", n)) {
                Ok(frame) => yield Ok::<_, Infallible>(frame),
                Err(status) => {
                    yield Ok(encode_trailers(&status));
                    return;
                }
            }
        }
        yield Ok(encode_trailers(&Status::ok()));
    };
    grpc_web_response(Body::from_stream(stream))
}

fn decode_request(body: Bytes) -> std::result::Result<EchoRequest, Status> {
    let invalid = |reason: String| Status::new(Code::InvalidArgument, reason);

    let payload = match FrameDecoder::new().feed(body).into_iter().next() {
        Some(Ok(Frame::Data(payload))) => payload,
        Some(Ok(Frame::Trailers(_))) | None => return Err(invalid("missing request frame".into())),
        Some(Err(e)) => return Err(invalid(e.to_string())),
    };
    serde_json::from_slice(&payload).map_err(|e| invalid(e.to_string()))
}

fn message_frame(message: &str) -> std::result::Result<Bytes, Status> {
    let response = EchoResponse {
        message: message.to_string(),
    };
    serde_json::to_vec(&response)
        .map(|payload| encode_frame(&payload))
        .map_err(|e| Status::internal(e.to_string()))
}

fn grpc_web_response(body: Body) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    (headers, body).into_response()
}

/// Response whose only content is the status, carried in the headers
fn trailers_only(status: &Status) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(GRPC_STATUS, HeaderValue::from(status.code.as_i32()));
    if let Ok(message) = HeaderValue::from_str(&encode_grpc_message(&status.message)) {
        headers.insert(GRPC_MESSAGE, message);
    }
    (headers, Body::empty()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let body = encode_frame(br#"{"message":"hi","repeat":2}"#);
        let request = decode_request(body).unwrap();
        assert_eq!(request, EchoRequest::new("hi").with_repeat(2));
    }

    #[test]
    fn test_decode_request_without_frame() {
        let status = decode_request(Bytes::new()).unwrap_err();
        assert_eq!(status.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = EchoServer::start().await.unwrap();
        assert_ne!(server.addr.port(), 0);
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        server.shutdown().await;
    }
}
