//! Traffic logging middleware
//!
//! [`TrafficLogLayer`] wraps any tower service speaking `http` types. For each
//! request tagged with an API name it:
//!
//! 1. records the start time,
//! 2. drains the request body into a pooled buffer (unless ignored) and hands
//!    the inner service a replay of the same bytes,
//! 3. wraps the response body so the bytes sent to the client are copied into
//!    a second pooled buffer (unless ignored),
//! 4. emits exactly one [`TrafficEvent`](crate::TrafficEvent) once the
//!    response body is finished.
//!
//! Requests without an API name go straight to the inner service, untouched
//! and unlogged.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use http_body_util::Full;
//! use std::convert::Infallible;
//! use tower::{service_fn, ServiceBuilder};
//! use trafficlog_core::{IgnoreApis, RequestBody, TrafficLogLayer};
//!
//! let service = ServiceBuilder::new()
//!     .layer(
//!         TrafficLogLayer::builder()
//!             .ignore(IgnoreApis::new().both("files.upload"))
//!             .build(),
//!     )
//!     .service(service_fn(|_req: http::Request<RequestBody<Full<Bytes>>>| async {
//!         Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from_static(b"ok"))))
//!     }));
//! ```

use crate::error::{BoxError, TrafficLogError};
use crate::extract::{DefaultExtractor, FieldExtractor};
use crate::ignore::{CaptureAll, IgnorePolicy};
use crate::pool::BufferPool;
use crate::request::{drain_into, RequestBody};
use crate::response::{Capture, Recorder, ResponseBody};
use crate::sink::{TracingSink, TrafficSink};
use bytes::Bytes;
use http::{header, HeaderValue, Request, Response, StatusCode};
use hyper::body::Body;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tower::{Layer, Service};

/// Collaborators shared by every request going through one layer
struct Shared {
    sink: Arc<dyn TrafficSink>,
    extractor: Arc<dyn FieldExtractor>,
    ignore: Arc<dyn IgnorePolicy>,
    pool: BufferPool,
}

/// Tower layer capturing traffic of tagged API calls
///
/// Cloning is cheap; clones share the sink, strategies and buffer pool.
#[derive(Clone)]
pub struct TrafficLogLayer {
    shared: Arc<Shared>,
}

impl TrafficLogLayer {
    /// Layer with default extractor, capture-all policy and tracing sink
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a layer
    pub fn builder() -> TrafficLogLayerBuilder {
        TrafficLogLayerBuilder::default()
    }

    /// Buffer pool used for body capture
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.shared.pool
    }
}

impl Default for TrafficLogLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TrafficLogLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficLogLayer")
            .field("pool", &self.shared.pool)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TrafficLogLayer {
    type Service = TrafficLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrafficLogService {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Builder for [`TrafficLogLayer`]
///
/// Every collaborator is optional:
///
/// | Setting | Default |
/// |---------|---------|
/// | `sink` | [`TracingSink`] at INFO |
/// | `extractor` | [`DefaultExtractor`] |
/// | `ignore` | [`CaptureAll`] |
/// | `buffer_pool` | a fresh [`BufferPool`] |
#[derive(Default)]
pub struct TrafficLogLayerBuilder {
    sink: Option<Arc<dyn TrafficSink>>,
    extractor: Option<Arc<dyn FieldExtractor>>,
    ignore: Option<Arc<dyn IgnorePolicy>>,
    pool: Option<BufferPool>,
}

impl TrafficLogLayerBuilder {
    /// Where events go
    pub fn sink(mut self, sink: impl TrafficSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Use an already shared sink
    pub fn shared_sink(mut self, sink: Arc<dyn TrafficSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// How event fields are read from requests
    pub fn extractor(mut self, extractor: impl FieldExtractor) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Which bodies are left out
    pub fn ignore(mut self, ignore: impl IgnorePolicy) -> Self {
        self.ignore = Some(Arc::new(ignore));
        self
    }

    /// Use an already shared policy
    pub fn shared_ignore(mut self, ignore: Arc<dyn IgnorePolicy>) -> Self {
        self.ignore = Some(ignore);
        self
    }

    /// Pool capture buffers are borrowed from
    pub fn buffer_pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Finish the layer
    pub fn build(self) -> TrafficLogLayer {
        TrafficLogLayer {
            shared: Arc::new(Shared {
                sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink::new())),
                extractor: self.extractor.unwrap_or_else(|| Arc::new(DefaultExtractor)),
                ignore: self.ignore.unwrap_or_else(|| Arc::new(CaptureAll)),
                pool: self.pool.unwrap_or_default(),
            }),
        }
    }
}

/// Service produced by [`TrafficLogLayer`]
#[derive(Clone)]
pub struct TrafficLogService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> TrafficLogService<S> {
    /// Wrap `inner` with a default layer
    pub fn new(inner: S) -> Self {
        TrafficLogLayer::new().layer(inner)
    }

    /// The wrapped service
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TrafficLogService<S>
where
    S: Service<Request<RequestBody<ReqBody>>, Response = Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes> + Send + 'static,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let shared = self.shared.clone();
        // The clone is not guaranteed ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let api_name = shared.extractor.api_name(&parts);
            if api_name.is_empty() {
                tracing::debug!(path = %parts.uri.path(), "No API name, traffic not logged");
                let req = Request::from_parts(parts, RequestBody::passthrough(body));
                let response = inner.call(req).await?;
                return Ok(response.map(ResponseBody::passthrough));
            }

            let started = Instant::now();
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);

            let (body, request_body) = if shared.ignore.ignore_request(&api_name) {
                (RequestBody::passthrough(body), None)
            } else {
                let mut buffer = shared.pool.get();
                if let Err(err) = drain_into(body, &mut buffer).await {
                    tracing::warn!(
                        api_name = %api_name,
                        path = %parts.uri.path(),
                        error = %err,
                        "Request body capture failed, request rejected"
                    );
                    return Ok(reject(&err));
                }
                (RequestBody::replay(&buffer), Some(buffer))
            };
            let response_body = (!shared.ignore.ignore_response(&api_name)).then(|| shared.pool.get());

            let capture = Capture {
                started,
                timestamp,
                ip: shared.extractor.client_ip(&parts),
                operator: shared.extractor.operator(&parts),
                method: parts.method.to_string(),
                host: shared.extractor.host(&parts),
                path: parts.uri.path().to_string(),
                query: parts.uri.query().unwrap_or_default().to_string(),
                api_name,
                request_body,
                response_body,
            };

            let response = inner.call(Request::from_parts(parts, body)).await?;

            let (parts, body) = response.into_parts();
            let recorder = Recorder::new(capture, parts.status.as_u16(), shared.sink.clone());
            Ok(Response::from_parts(parts, ResponseBody::recording(body, recorder)))
        })
    }
}

/// Plain-text 500 answer for a request whose body could not be captured
fn reject<B>(err: &TrafficLogError) -> Response<ResponseBody<B>> {
    let mut response = Response::new(ResponseBody::rejected(Bytes::from(format!("{}\n", err))));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
