//! Event assembly benchmarks
//!
//! Measures the body encoding applied when an event is built and the cost
//! of serializing the event to one JSON line.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use trafficlog_core::{is_json, LoggedBody, RequestSnapshot, ResponseSnapshot, TrafficEvent};

fn pretty_json(items: usize) -> Vec<u8> {
    let value = serde_json::json!({
        "items": (0..items).map(|i| serde_json::json!({ "id": i, "name": format!("item-{}", i) })).collect::<Vec<_>>()
    });
    serde_json::to_vec_pretty(&value).unwrap()
}

/// Benchmark turning captured bytes into an event body
fn bench_logged_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("logged_body");

    for items in [1usize, 16, 256].iter() {
        let json = pretty_json(*items);
        group.bench_with_input(BenchmarkId::new("json", items), &json, |b, json| {
            b.iter(|| {
                let mut captured = json.clone();
                black_box(LoggedBody::from_captured(&mut captured))
            })
        });

        let text = vec![b'a'; json.len()];
        group.bench_with_input(BenchmarkId::new("opaque", items), &text, |b, text| {
            b.iter(|| {
                let mut captured = text.clone();
                black_box(LoggedBody::from_captured(&mut captured))
            })
        });
    }

    group.bench_function("is_json_rejects_early", |b| {
        let binary = vec![0xffu8; 4096];
        b.iter(|| is_json(black_box(&binary)))
    });

    group.finish();
}

/// Benchmark serializing an event to a JSON line
fn bench_serialize_event(c: &mut Criterion) {
    let mut body = pretty_json(16);
    let event = TrafficEvent {
        timestamp: 1_700_000_000,
        api_name: "orders.list".to_string(),
        ip: "203.0.113.9".to_string(),
        operator: "alice".to_string(),
        latency: Duration::from_micros(1734),
        request: RequestSnapshot {
            method: "GET".to_string(),
            host: "api.example.com".to_string(),
            path: "/orders".to_string(),
            query: "page=1".to_string(),
            body: None,
        },
        response: ResponseSnapshot {
            status: 200,
            body: LoggedBody::from_captured(&mut body),
        },
    };
    let opaque = TrafficEvent {
        response: ResponseSnapshot {
            status: 200,
            body: Some(LoggedBody::Opaque(Bytes::from(vec![b'a'; 1024]))),
        },
        ..event.clone()
    };

    c.bench_function("serialize_event_json", |b| {
        b.iter(|| serde_json::to_vec(black_box(&event)))
    });
    c.bench_function("serialize_event_opaque", |b| {
        b.iter(|| serde_json::to_vec(black_box(&opaque)))
    });
}

criterion_group!(benches, bench_logged_body, bench_serialize_event);
criterion_main!(benches);
