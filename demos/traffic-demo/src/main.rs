//! Demo server
//!
//! ```text
//! TRAFFIC_LOG_SINK=file TRAFFIC_LOG_DIR=./logs cargo run -p traffic-demo
//! curl -H 'X-Api-Name: orders.create' -d '{"sku":"A-1"}' localhost:3000/orders
//! ```

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use trafficlog::prelude::*;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

type AppRequest = Request<RequestBody<Incoming>>;

async fn app(req: AppRequest) -> Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => Ok(text(StatusCode::OK, "ok\n")),
        (&Method::POST, "/orders") => {
            let body = req.into_body().collect().await?.to_bytes();
            let order: serde_json::Value = match serde_json::from_slice(&body) {
                Ok(order) => order,
                Err(err) => return Ok(text(StatusCode::BAD_REQUEST, &format!("{}\n", err))),
            };
            let reply = serde_json::json!({ "id": 1, "order": order });
            Ok(json(StatusCode::CREATED, reply.to_string()))
        }
        _ => Ok(text(StatusCode::NOT_FOUND, "not found\n")),
    }
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::copy_from_slice(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SinkConfig::from_env()?;
    let layer = TrafficLogLayer::builder()
        .shared_sink(config.build().await?)
        .shared_ignore(config.ignore_policy())
        .build();
    let service = ServiceBuilder::new()
        .layer(layer)
        .service(tower::service_fn(app));

    let addr: SocketAddr = std::env::var("TRAFFIC_DEMO_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Traffic demo listening on http://{}", addr);

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let service = service.clone();

        tokio::spawn(async move {
            let connection = service_fn(move |mut req: Request<Incoming>| {
                req.extensions_mut().insert(PeerAddr(remote_addr));
                service.clone().oneshot(req)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, connection).await {
                error!("Connection error: {}", err);
            }
        });
    }
}
