use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use azpipe::prelude::{
    BlockingPipeline, ErrorCode, Pipeline, Request, Response, RetryConfig, ServiceClient,
    Transport,
};
use bytes::Bytes;
use futures_util::stream;
use http::StatusCode;
use serde_json::{Value, json};

/// Fails the first `failures` attempts with 503, then echoes the request
/// body as a streamed JSON response.
struct EchoTransport {
    failures: usize,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl EchoTransport {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: &mut Request) -> azpipe::Result<Response> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .expect("lock urls")
            .push(request.url().to_owned());
        let body = request.take_body_for_attempt()?.collect().await?;
        if attempt < self.failures {
            return Ok(Response::from_status(StatusCode::SERVICE_UNAVAILABLE));
        }
        let chunks = vec![Ok::<_, std::io::Error>(body)];
        Response::from_status(StatusCode::OK)
            .with_body(azpipe::ResponseBody::from_stream(stream::iter(chunks)))
            .with_header("content-type", "application/json")
    }
}

fn retry() -> RetryConfig {
    RetryConfig::new(2)
        .base_delay(Duration::from_millis(1))
        .jitter_ratio(0.0)
}

#[test]
fn blocking_pipeline_retries_and_buffers_the_response() {
    let transport = EchoTransport::new(1);
    let pipeline = Pipeline::builder(transport.clone()).policy(retry()).build();
    let blocking = BlockingPipeline::new(pipeline).expect("runtime should start");

    let response = blocking
        .send(
            Request::post("https://example.com/echo")
                .json(&json!({ "name": "alpha" }))
                .expect("json should serialize"),
        )
        .expect("call should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.body(),
        Some(&Bytes::from_static(br#"{"name":"alpha"}"#))
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn blocking_pipeline_can_be_reused_for_many_calls() {
    let transport = EchoTransport::new(0);
    let blocking = BlockingPipeline::new(Pipeline::builder(transport.clone()).build())
        .expect("runtime should start");

    for index in 0..3 {
        let mut request = Request::put(format!("https://example.com/items/{index}")).body("x");
        let response = blocking
            .send_request(&mut request)
            .expect("call should succeed");
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn service_client_blocking_handle_shares_the_pipeline() {
    let transport = EchoTransport::new(0);
    let client = ServiceClient::builder("https://example.com/api")
        .bearer_token("token")
        .transport(transport.clone())
        .try_build()
        .expect("client should build");
    let blocking = client.blocking().expect("runtime should start");

    let response = blocking
        .send(
            client
                .post("items")
                .json(&json!({ "id": 7 }))
                .expect("json should serialize"),
        )
        .expect("call should succeed");

    let body: Value =
        serde_json::from_slice(response.body().expect("response is buffered")).expect("json");
    assert_eq!(body, json!({ "id": 7 }));
    assert_eq!(
        transport.urls.lock().expect("lock urls").clone(),
        vec!["https://example.com/api/items"]
    );
}

#[test]
fn blocking_pipeline_surfaces_pipeline_errors() {
    let blocking = BlockingPipeline::new(Pipeline::builder(EchoTransport::new(0)).build())
        .expect("runtime should start");

    let mut request = Request::post("https://example.com/once").body(
        azpipe::RequestBody::once(stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(b"once"),
        )])),
    );
    blocking
        .send_request(&mut request)
        .expect("first send consumes the body");
    let error = blocking
        .send_request(&mut request)
        .expect_err("one-shot body cannot be sent twice");

    assert_eq!(error.code(), ErrorCode::BodyAlreadyConsumed);
}
