use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use tower::{service_fn, Layer, ServiceExt};
use trafficlog_core::{JsonLinesSink, RequestBody, TrafficLogLayer};
use trafficlog_writers::FileWriter;

#[tokio::test]
async fn test_events_land_in_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let writer = FileWriter::open(dir.path(), "traffic").unwrap();
    let layer = TrafficLogLayer::builder()
        .sink(JsonLinesSink::new(writer))
        .build();
    let service = layer.layer(service_fn(|_req: Request<RequestBody<Full<Bytes>>>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"{\"ok\":\ntrue}"))))
    }));

    for api_name in ["orders.get", "orders.list"] {
        let req = Request::builder()
            .uri("/orders?page=2")
            .header("x-api-name", api_name)
            .header("x-forwarded-user-name", "alice")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.clone().oneshot(req).await.unwrap();
        response.into_body().collect().await.unwrap();
    }

    let text = std::fs::read_to_string(dir.path().join("traffic.log")).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["api_name"], "orders.get");
    assert_eq!(lines[1]["api_name"], "orders.list");
    assert_eq!(lines[0]["operator"], "alice");
    assert_eq!(lines[0]["request"]["query"], "page=2");
    assert_eq!(lines[0]["response"]["body"]["ok"], true);
    assert!(lines[0]["latency"].as_f64().unwrap() >= 0.0);
}

#[test]
fn test_reopen_keeps_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    {
        use std::io::Write;
        let mut first = FileWriter::open(dir.path(), "traffic").unwrap();
        first.write_all(b"first run\n").unwrap();
    }
    FileWriter::open(dir.path(), "traffic").unwrap();

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2);
    let current = std::fs::read_to_string(dir.path().join("traffic.log")).unwrap();
    assert!(current.is_empty());
}
