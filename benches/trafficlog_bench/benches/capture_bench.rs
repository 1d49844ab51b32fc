//! Capture overhead benchmarks
//!
//! Runs one request through the traffic logger per iteration and compares
//! the untagged passthrough path with full and body-less capture.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use tower::{service_fn, Layer, ServiceExt};
use trafficlog_core::{
    BufferPool, IgnoreAll, MemorySink, RequestBody, TrafficEvent, TrafficLogLayer, TrafficSink,
};

/// Sink that throws events away
struct NullSink;

impl TrafficSink for NullSink {
    fn emit(&self, event: &TrafficEvent) {
        black_box(event);
    }
}

async fn echo(req: Request<RequestBody<Full<Bytes>>>) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = req.into_body().collect().await?.to_bytes();
    Ok(Response::new(Full::new(body)))
}

fn request(api_name: Option<&str>, body: &Bytes) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/orders?page=1")
        .header("x-real-ip", "203.0.113.9");
    if let Some(api_name) = api_name {
        builder = builder.header("x-api-name", api_name);
    }
    builder
        .body(Full::new(body.clone()))
        .unwrap()
}

fn json_body(size: usize) -> Bytes {
    let items: Vec<u32> = (0..size as u32 / 4).collect();
    Bytes::from(serde_json::to_vec(&serde_json::json!({ "items": items })).unwrap())
}

/// Benchmark one request through each capture mode
fn bench_capture_modes(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("capture_modes");

    for size in [64usize, 1024, 16 * 1024].iter() {
        let body = json_body(*size);
        group.throughput(Throughput::Bytes(body.len() as u64));

        let capture = TrafficLogLayer::builder().sink(NullSink).build().layer(service_fn(echo));
        let bodiless = TrafficLogLayer::builder()
            .sink(NullSink)
            .ignore(IgnoreAll)
            .build()
            .layer(service_fn(echo));

        group.bench_with_input(BenchmarkId::new("passthrough", size), &body, |b, body| {
            b.iter(|| {
                runtime.block_on(async {
                    let response = capture.clone().oneshot(request(None, body)).await?;
                    response.into_body().collect().await.map(|collected| black_box(collected.to_bytes()))
                })
            })
        });

        group.bench_with_input(BenchmarkId::new("capture", size), &body, |b, body| {
            b.iter(|| {
                runtime.block_on(async {
                    let response = capture.clone().oneshot(request(Some("orders.create"), body)).await?;
                    response.into_body().collect().await.map(|collected| black_box(collected.to_bytes()))
                })
            })
        });

        group.bench_with_input(BenchmarkId::new("ignore_bodies", size), &body, |b, body| {
            b.iter(|| {
                runtime.block_on(async {
                    let response = bodiless.clone().oneshot(request(Some("orders.create"), body)).await?;
                    response.into_body().collect().await.map(|collected| black_box(collected.to_bytes()))
                })
            })
        });
    }

    group.finish();
}

/// Benchmark buffer borrow/return against fresh allocation
fn bench_buffer_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");
    let chunk = vec![b'x'; 4096];

    group.bench_function("pooled", |b| {
        let pool = BufferPool::new();
        b.iter(|| {
            let mut buffer = pool.get();
            buffer.extend_from_slice(black_box(&chunk));
            black_box(buffer.len())
        })
    });

    group.bench_function("allocated", |b| {
        b.iter(|| {
            let mut buffer = Vec::new();
            buffer.extend_from_slice(black_box(&chunk));
            black_box(buffer.len())
        })
    });

    group.finish();
}

/// Benchmark the in-memory sink used by tests
fn bench_memory_sink(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let sink = MemorySink::new();
    let service = TrafficLogLayer::builder().sink(sink.clone()).build().layer(service_fn(echo));
    let body = json_body(256);

    c.bench_function("memory_sink_request", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let response = service.clone().oneshot(request(Some("orders.create"), &body)).await?;
                response.into_body().collect().await.map(|collected| black_box(collected.to_bytes()))
            })
        })
    });

    black_box(sink.len());
}

criterion_group!(benches, bench_capture_modes, bench_buffer_pool, bench_memory_sink);
criterion_main!(benches);
