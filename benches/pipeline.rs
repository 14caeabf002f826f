use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use azpipe::prelude::{
    CookieConfig, HostConfig, Request, RequestBody, Response, RetryConfig, ServiceClient,
    Transport, UserAgentConfig,
};
use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{future::join_all, stream};
use http::StatusCode;
use tokio::runtime::Runtime;

/// Answers every attempt in memory; every `fail_every`-th attempt gets 503.
struct InMemoryTransport {
    fail_every: usize,
    attempts: AtomicUsize,
}

impl InMemoryTransport {
    fn new(fail_every: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_every,
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, request: &mut Request) -> azpipe::Result<Response> {
        let body = request.take_body_for_attempt()?.collect().await?;
        black_box(body.len());
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            return Ok(Response::from_status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Response::from_status(StatusCode::OK)
            .with_body(r#"{"ok":true}"#)
            .with_header("content-type", "application/json")
    }
}

fn benchmark_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build benchmark runtime")
}

fn benchmark_client(transport: Arc<InMemoryTransport>) -> ServiceClient {
    ServiceClient::builder("https://vault.example.com")
        .bearer_token("benchmark-token")
        .user_agent(UserAgentConfig::new("bench/1.0"))
        .retry(RetryConfig::new(3).base_delay(Duration::ZERO).jitter_ratio(0.0))
        .timeout(Duration::from_secs(5))
        .cookies(CookieConfig::new())
        .host(HostConfig::new("vault.example.com"))
        .transport(transport)
        .build()
}

fn bench_full_chain_latency(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client(InMemoryTransport::new(0));

    let mut group = c.benchmark_group("full_chain_latency");
    group.sample_size(80);
    group.bench_function("get_200_json", |b| {
        b.to_async(&runtime).iter(|| async {
            let response = client
                .send(client.get("/secrets/a").query_pair("api-version", "7.4"))
                .await
                .expect("get should succeed");
            black_box(response.status());
        });
    });
    group.bench_function("get_with_one_retry", |b| {
        let client = benchmark_client(InMemoryTransport::new(2));
        b.to_async(&runtime).iter(|| {
            let client = client.clone();
            async move {
                let response = client
                    .send(client.get("/secrets/a"))
                    .await
                    .expect("get should succeed");
                black_box(response.status());
            }
        });
    });
    group.finish();
}

fn bench_concurrent_calls(c: &mut Criterion) {
    let runtime = benchmark_runtime();
    let client = benchmark_client(InMemoryTransport::new(0));

    let mut group = c.benchmark_group("concurrent_calls");
    group.sample_size(40);
    for concurrency in [8_usize, 32, 128] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&runtime).iter(|| {
                    let client = client.clone();
                    async move {
                        let calls = (0..concurrency).map(|_| client.send(client.get("/secrets/a")));
                        for response in join_all(calls).await {
                            black_box(response.expect("concurrent call should succeed").status());
                        }
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_upload_bodies(c: &mut Criterion) {
    const PAYLOAD_BYTES: usize = 256 * 1024;
    const CHUNK_BYTES: usize = 16 * 1024;

    let runtime = benchmark_runtime();
    let client = benchmark_client(InMemoryTransport::new(0));
    let payload = Bytes::from(vec![b'x'; PAYLOAD_BYTES]);
    let chunks: Arc<Vec<Bytes>> = Arc::new(
        payload
            .chunks(CHUNK_BYTES)
            .map(Bytes::copy_from_slice)
            .collect(),
    );

    let mut group = c.benchmark_group("upload_256k");
    group.sample_size(40);
    group.throughput(Throughput::Bytes(PAYLOAD_BYTES as u64));
    group.bench_function("buffered", |b| {
        b.to_async(&runtime).iter(|| {
            let client = client.clone();
            let payload = payload.clone();
            async move {
                let response = client
                    .send(client.put("/blobs/a").body(payload))
                    .await
                    .expect("buffered upload should succeed");
                black_box(response.status());
            }
        });
    });
    group.bench_function("stream_factory", |b| {
        b.to_async(&runtime).iter(|| {
            let client = client.clone();
            let chunks = Arc::clone(&chunks);
            async move {
                let body = RequestBody::from_factory(move || {
                    stream::iter(
                        chunks
                            .iter()
                            .cloned()
                            .map(Ok::<_, std::io::Error>)
                            .collect::<Vec<_>>(),
                    )
                });
                let response = client
                    .send(client.put("/blobs/a").body(body))
                    .await
                    .expect("streamed upload should succeed");
                black_box(response.status());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_full_chain_latency,
    bench_concurrent_calls,
    bench_upload_bodies
);
criterion_main!(benches);
