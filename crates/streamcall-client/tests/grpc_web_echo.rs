//! End-to-end tests over HTTP
//!
//! These tests spin up the in-process echo server and talk to it through
//! the grpc-web transport.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use streamcall_client::echo::{EchoClient, EchoRequest, EchoResponse, ECHO_SERVICE};
use streamcall_client::grpc_web::frame::encode_frame;
use streamcall_client::grpc_web::GrpcWebTransport;
use streamcall_client::testing::{EchoServer, FAIL_MESSAGE};
use streamcall_client::{
    resolve, CallState, Channel, ClientStub, Code, EndpointConfig, JsonCodec, MethodDescriptor,
    Outcome, Status, StreamEvent,
};

type Event = StreamEvent<EchoResponse>;

fn data(message: &str) -> Event {
    StreamEvent::Data(EchoResponse {
        message: message.to_string(),
    })
}

fn stub(channel: &Channel, method: &str) -> ClientStub<JsonCodec<EchoRequest, EchoResponse>> {
    ClientStub::bind_json(channel, MethodDescriptor::server_streaming(ECHO_SERVICE, method))
        .unwrap()
}

#[tokio::test]
async fn test_echo_hi() {
    let server = EchoServer::start().await.unwrap();
    let client = server.client().unwrap();

    let events: Vec<_> = client.echo_stream(&EchoRequest::new("hi")).collect().await;
    assert_eq!(events, vec![data("hi"), StreamEvent::End]);
}

#[tokio::test]
async fn test_echo_with_callback_subscriber() {
    let server = EchoServer::start().await.unwrap();
    let client = server.client().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let call = client.echo(&EchoRequest::new("Hello World!").with_repeat(3));
    {
        let seen = seen.clone();
        call.subscribe(move |event: &Event| seen.lock().push(event.clone()));
    }

    assert_eq!(call.finished().await, Outcome::End);
    assert_eq!(call.state(), CallState::Completed);
    assert_eq!(
        *seen.lock(),
        vec![
            data("Hello World!"),
            data("Hello World!"),
            data("Hello World!"),
            StreamEvent::End
        ]
    );
    assert!(call.headers().is_some());
}

#[tokio::test]
async fn test_path_prefix() {
    let server = EchoServer::start().await.unwrap();
    let endpoint =
        resolve(&EndpointConfig::new(server.base_url()).with_path_prefix("api")).unwrap();
    let client = EchoClient::new(&Channel::grpc_web(endpoint).unwrap()).unwrap();

    let response = client.say(&EchoRequest::new("prefixed")).await.unwrap();
    assert_eq!(response.message, "prefixed");
}

#[tokio::test]
async fn test_unary_say() {
    let server = EchoServer::start().await.unwrap();
    let client = server.client().unwrap();

    let response = client.say(&EchoRequest::new("hello")).await.unwrap();
    assert_eq!(
        response,
        EchoResponse {
            message: "hello".into()
        }
    );
}

#[tokio::test]
async fn test_trailers_only_rejection() {
    let server = EchoServer::start().await.unwrap();
    let channel = server.channel().unwrap();

    let events: Vec<_> = stub(&channel, "Fail")
        .stream(&EchoRequest::new("hi"))
        .collect()
        .await;
    assert_eq!(
        events,
        vec![StreamEvent::Status(Status::unavailable(FAIL_MESSAGE))]
    );
}

#[tokio::test]
async fn test_unknown_method_is_unimplemented() {
    let server = EchoServer::start().await.unwrap();
    let channel = server.channel().unwrap();

    let call = stub(&channel, "Nope").invoke(&EchoRequest::new("hi"));
    assert_eq!(call.status().await.code, Code::Unimplemented);
}

#[tokio::test]
async fn test_cancel_streaming_call() {
    let server = EchoServer::start().await.unwrap();
    let channel = server.channel().unwrap();

    let mut events = stub(&channel, "Ticks").stream(&EchoRequest::new("tick"));
    assert_eq!(events.next().await, Some(data("tick 1")));
    assert_eq!(events.next().await, Some(data("tick 2")));

    assert!(events.call().cancel());
    assert_eq!(channel.active_calls(), 0);

    // A tick dispatched before the cancel may still be buffered
    let rest: Vec<_> = events.collect().await;
    assert_eq!(
        rest.last(),
        Some(&StreamEvent::Status(Status::cancelled()))
    );
    assert!(rest.len() <= 2);
}

#[tokio::test]
async fn test_channel_close_during_stream() {
    let server = EchoServer::start().await.unwrap();
    let channel = server.channel().unwrap();
    let ticks = stub(&channel, "Ticks");

    let mut a = ticks.stream(&EchoRequest::new("a"));
    let mut b = ticks.stream(&EchoRequest::new("b"));
    assert!(a.next().await.is_some());
    assert!(b.next().await.is_some());

    channel.close();

    let rest_a: Vec<_> = a.collect().await;
    let rest_b: Vec<_> = b.collect().await;
    for rest in [rest_a, rest_b] {
        // A tick already queued may precede the status; nothing follows it
        let last = rest.last().unwrap();
        assert_eq!(last, &StreamEvent::Status(Status::unavailable("channel closed")));
        assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);
    }
}

#[tokio::test]
async fn test_connection_refused() {
    // Reserve a port, then free it so nothing listens there
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let endpoint = resolve(&EndpointConfig::new(format!("http://{}", addr))).unwrap();
    let client = EchoClient::new(&Channel::grpc_web(endpoint.clone()).unwrap()).unwrap();

    let call = client.echo(&EchoRequest::new("hi"));
    assert_eq!(call.status().await.code, Code::Unavailable);

    let transport = Arc::new(GrpcWebTransport::new().unwrap());
    assert!(Channel::connect(endpoint, transport).await.is_err());
}

#[tokio::test]
async fn test_connect_to_live_server() {
    let server = EchoServer::start().await.unwrap();
    let transport = Arc::new(GrpcWebTransport::new().unwrap());

    let channel = Channel::connect(server.endpoint().unwrap(), transport)
        .await
        .unwrap();
    let client = EchoClient::new(&channel).unwrap();
    assert_eq!(client.say(&EchoRequest::new("up")).await.unwrap().message, "up");
}

#[tokio::test]
async fn test_body_without_trailers_fails() {
    let router = Router::new().route(
        &format!("/{}/Echo", ECHO_SERVICE),
        post(|| async {
            (
                [(CONTENT_TYPE, "application/grpc-web+json")],
                Body::from(encode_frame(br#"{"message":"partial"}"#)),
            )
        }),
    );
    let server = EchoServer::serve(router).await.unwrap();
    let client = server.client().unwrap();

    let events: Vec<_> = client.echo_stream(&EchoRequest::new("hi")).collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], data("partial"));
    assert_eq!(events[1].status().unwrap().code, Code::Internal);
}
