use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use proptest::prelude::*;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::{service_fn, Layer, ServiceExt};
use trafficlog_core::{
    BufferPool, FailingBody, IgnoreApis, LoggedBody, MemorySink, RequestBody, TrafficLogLayer,
};

type Handled<B> = Request<RequestBody<B>>;

fn tagged(api_name: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("x-api-name", api_name)
        .body(Full::new(body.into()))
        .unwrap()
}

type Chunked = StreamBody<futures_util::stream::Iter<std::vec::IntoIter<Result<Frame<Bytes>, Infallible>>>>;

fn chunked(chunks: Vec<Vec<u8>>) -> Chunked {
    let frames: Vec<Result<Frame<Bytes>, Infallible>> = chunks
        .into_iter()
        .map(|chunk| Ok(Frame::data(Bytes::from(chunk))))
        .collect();
    StreamBody::new(futures_util::stream::iter(frames))
}

#[tokio::test]
async fn test_orders_get_scenario() {
    let sink = MemorySink::new();
    let layer = TrafficLogLayer::builder().sink(sink.clone()).build();
    let service = layer.layer(service_fn(|_req: Handled<Full<Bytes>>| async {
        let mut response = Response::new(Full::new(Bytes::from_static(b"{\"ok\":true}\n")));
        *response.status_mut() = StatusCode::OK;
        Ok::<_, Infallible>(response)
    }));

    let req = Request::builder()
        .uri("/orders?id=42")
        .header("x-api-name", "orders.get")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = service.oneshot(req).await.unwrap();
    let delivered = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(delivered, Bytes::from_static(b"{\"ok\":true}\n"));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.api_name, "orders.get");
    assert_eq!(event.request.body, None);
    assert_eq!(event.response.status, 200);
    assert_eq!(
        event.response.body,
        Some(LoggedBody::Json("{\"ok\":true} ".to_string()))
    );

    let line = serde_json::to_value(event).unwrap();
    assert!(line["request"].get("body").is_none());
    assert_eq!(line["request"]["query"], "id=42");
    assert_eq!(line["response"]["body"]["ok"], true);
}

#[tokio::test]
async fn test_untagged_request_is_not_logged() {
    let sink = MemorySink::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let layer = TrafficLogLayer::builder().sink(sink.clone()).build();
    let service = layer.layer(service_fn(move |req: Handled<Full<Bytes>>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let body = req.into_body().collect().await?.to_bytes();
            Ok::<_, Infallible>(Response::new(Full::new(body)))
        }
    }));

    let req = Request::builder()
        .uri("/health")
        .body(Full::new(Bytes::from_static(b"ping")))
        .unwrap();
    let response = service.oneshot(req).await.unwrap();
    let delivered = response.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(delivered, Bytes::from_static(b"ping"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_handler_reads_exact_streamed_body() {
    let sink = MemorySink::new();
    let layer = TrafficLogLayer::builder().sink(sink.clone()).build();
    let service = layer.layer(service_fn(|req: Handled<Chunked>| async move {
        assert!(req.body().is_replay());
        let body = req.into_body().collect().await?.to_bytes();
        Ok::<_, Infallible>(Response::new(Full::new(body)))
    }));

    let req = Request::builder()
        .header("x-api-name", "letters.post")
        .body(chunked(vec![b"alpha,".to_vec(), b"beta,".to_vec(), b"gamma".to_vec()]))
        .unwrap();

    let response = service.oneshot(req).await.unwrap();
    let delivered = response.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(delivered, Bytes::from_static(b"alpha,beta,gamma"));
    let events = sink.events();
    assert_eq!(
        events[0].request.body,
        Some(LoggedBody::Opaque(Bytes::from_static(b"alpha,beta,gamma")))
    );
}

#[tokio::test]
async fn test_ignored_response_is_still_delivered() {
    let sink = MemorySink::new();
    let layer = TrafficLogLayer::builder()
        .sink(sink.clone())
        .ignore(IgnoreApis::new().response("orders.get"))
        .build();
    let service = layer.layer(service_fn(|_req: Handled<Full<Bytes>>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"{\"items\":[1,2,3]}"))))
    }));

    let response = service.oneshot(tagged("orders.get", "{\"page\":1}")).await.unwrap();
    let delivered = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(delivered, Bytes::from_static(b"{\"items\":[1,2,3]}"));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].response.body, None);
    assert_eq!(
        events[0].request.body,
        Some(LoggedBody::Json("{\"page\":1}".to_string()))
    );
}

#[tokio::test]
async fn test_body_read_failure_aborts_request() {
    let sink = MemorySink::new();
    let pool = BufferPool::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let layer = TrafficLogLayer::builder()
        .sink(sink.clone())
        .buffer_pool(pool.clone())
        .build();
    let service = layer.layer(service_fn(move |_req: Handled<FailingBody>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, Infallible>(Response::new(Full::new(Bytes::new()))) }
    }));

    let req = Request::builder()
        .header("x-api-name", "orders.create")
        .body(FailingBody::after(b"{\"id\":"))
        .unwrap();
    let response = service.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let text = response.into_body().collect().await.unwrap().to_bytes();
    assert!(text.ends_with(b"\n"));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(sink.is_empty());
    let stats = pool.stats();
    assert_eq!(stats.borrowed, 1);
    assert_eq!(stats.returned, 1);
}

#[tokio::test]
async fn test_panicking_handler_returns_buffers() {
    let sink = MemorySink::new();
    let pool = BufferPool::new();
    let layer = TrafficLogLayer::builder()
        .sink(sink.clone())
        .buffer_pool(pool.clone())
        .build();
    let service = layer.layer(service_fn(|_req: Handled<Full<Bytes>>| async {
        if true {
            panic!("handler blew up");
        }
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::new())))
    }));

    let outcome = AssertUnwindSafe(service.oneshot(tagged("orders.create", "{}")))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    assert!(sink.is_empty());
    assert_eq!(pool.stats().borrowed, 2);
    assert_eq!(pool.stats().outstanding(), 0);
}

#[tokio::test]
async fn test_pool_is_balanced_after_concurrent_requests() {
    let sink = MemorySink::new();
    let pool = BufferPool::new();
    let layer = TrafficLogLayer::builder()
        .sink(sink.clone())
        .buffer_pool(pool.clone())
        .build();
    let service = layer.layer(service_fn(|req: Handled<Full<Bytes>>| async move {
        let body = req.into_body().collect().await?.to_bytes();
        tokio::task::yield_now().await;
        Ok::<_, Infallible>(Response::new(Full::new(body)))
    }));

    let requests = (0..64).map(|i| {
        let service = service.clone();
        async move {
            let body = format!("{{\"n\":{}}}", i);
            let response = service.oneshot(tagged("numbers.echo", body.clone())).await.unwrap();
            let delivered = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(delivered, Bytes::from(body));
        }
    });
    join_all(requests).await;

    let events = sink.events();
    assert_eq!(events.len(), 64);
    for event in &events {
        // Each event carries its own request, never a neighbour's bytes.
        assert_eq!(event.request.body, event.response.body);
    }
    let stats = pool.stats();
    assert_eq!(stats.borrowed, 128);
    assert_eq!(stats.returned, 128);
    assert!(stats.idle > 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_delivery_is_identical_with_and_without_capture(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..8),
        tag in proptest::option::of("[a-z]{1,8}\\.[a-z]{1,8}"),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let expected: Vec<u8> = chunks.concat();

        let (seen, delivered, logged) = runtime.block_on(async {
            let sink = MemorySink::new();
            let layer = TrafficLogLayer::builder().sink(sink.clone()).build();
            let response_chunks = chunks.clone();
            let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
            let seen_by_handler = seen.clone();
            let service = layer.layer(service_fn(move |req: Handled<Full<Bytes>>| {
                let response_chunks = response_chunks.clone();
                let seen = seen_by_handler.clone();
                async move {
                    let request = req.into_body().collect().await?.to_bytes();
                    seen.lock().unwrap().extend_from_slice(&request);
                    Ok::<_, Infallible>(Response::new(chunked(response_chunks)))
                }
            }));

            let mut builder = Request::builder().method("PUT").uri("/blob");
            if let Some(tag) = &tag {
                builder = builder.header("x-api-name", tag.as_str());
            }
            let req = builder.body(Full::new(Bytes::from(expected.clone()))).unwrap();

            let response = service.oneshot(req).await.unwrap();
            let delivered = response.into_body().collect().await.unwrap().to_bytes();
            let seen = seen.lock().unwrap().clone();
            (seen, delivered, sink.len())
        });

        prop_assert_eq!(&seen[..], &expected[..]);
        prop_assert_eq!(&delivered[..], &expected[..]);
        prop_assert_eq!(logged, usize::from(tag.is_some()));
    }
}
