//! Response interception
//!
//! [`ResponseBody`] wraps the body produced by the inner service. Frames are
//! forwarded to the client unchanged and in order; when a capture buffer is
//! attached, the bytes of every data frame are appended to it on the way
//! through. Nothing is buffered in front of the client.
//!
//! The body owns the [`Recorder`] of its request, and the recorder emits the
//! traffic event when the body finishes: at end of stream, or when the body
//! is dropped before that (the client went away mid-response).

use crate::event::{LoggedBody, RequestSnapshot, ResponseSnapshot, TrafficEvent};
use crate::pool::Pooled;
use crate::sink::TrafficSink;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

/// Everything known about a logged request before its response streams
pub(crate) struct Capture {
    pub(crate) started: Instant,
    pub(crate) timestamp: i64,
    pub(crate) api_name: String,
    pub(crate) ip: String,
    pub(crate) operator: String,
    pub(crate) method: String,
    pub(crate) host: String,
    pub(crate) path: String,
    pub(crate) query: String,
    pub(crate) request_body: Option<Pooled<Vec<u8>>>,
    pub(crate) response_body: Option<Pooled<Vec<u8>>>,
}

/// Collects the response side of a logged request and emits its event
///
/// The event is emitted at most once. Capture buffers go back to their pool
/// when the recorder is dropped.
pub struct Recorder {
    capture: Capture,
    status: u16,
    sink: Arc<dyn TrafficSink>,
    emitted: bool,
}

impl Recorder {
    pub(crate) fn new(capture: Capture, status: u16, sink: Arc<dyn TrafficSink>) -> Self {
        Self {
            capture,
            status,
            sink,
            emitted: false,
        }
    }

    /// Response status being recorded
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether response bytes are being copied
    pub fn is_capturing(&self) -> bool {
        self.capture.response_body.is_some()
    }

    fn record(&mut self, data: &[u8]) {
        if let Some(buffer) = self.capture.response_body.as_mut() {
            buffer.extend_from_slice(data);
        }
    }

    fn emit(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;
        let latency = self.capture.started.elapsed();

        let capture = &mut self.capture;
        let request_body = capture
            .request_body
            .as_mut()
            .and_then(|buffer| LoggedBody::from_captured(buffer));
        let response_body = capture
            .response_body
            .as_mut()
            .and_then(|buffer| LoggedBody::from_captured(buffer));

        let event = TrafficEvent {
            timestamp: capture.timestamp,
            api_name: std::mem::take(&mut capture.api_name),
            ip: std::mem::take(&mut capture.ip),
            operator: std::mem::take(&mut capture.operator),
            latency,
            request: RequestSnapshot {
                method: std::mem::take(&mut capture.method),
                host: std::mem::take(&mut capture.host),
                path: std::mem::take(&mut capture.path),
                query: std::mem::take(&mut capture.query),
                body: request_body,
            },
            response: ResponseSnapshot {
                status: self.status,
                body: response_body,
            },
        };
        self.sink.emit(&event);
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // An unwinding handler gets its buffers back but no event.
        if !std::thread::panicking() {
            self.emit();
        }
    }
}

pin_project! {
    /// Response body returned by the traffic logger
    #[project = ResponseBodyProj]
    pub enum ResponseBody<B> {
        /// Request not logged, body forwarded as is
        Passthrough {
            #[pin]
            inner: B,
        },
        /// Body forwarded while being recorded
        Recording {
            #[pin]
            inner: B,
            recorder: Option<Recorder>,
        },
        /// Error answer produced by the traffic logger itself
        Rejected {
            #[pin]
            inner: Full<Bytes>,
        },
    }
}

impl<B> ResponseBody<B> {
    /// Forward `inner` without recording
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    pub(crate) fn recording(inner: B, recorder: Recorder) -> Self {
        Self::Recording {
            inner,
            recorder: Some(recorder),
        }
    }

    pub(crate) fn rejected(body: Bytes) -> Self {
        Self::Rejected {
            inner: Full::new(body),
        }
    }

    /// Whether this body is being recorded for a traffic event
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }
}

impl<B> Body for ResponseBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            ResponseBodyProj::Passthrough { inner } => inner.poll_frame(cx),
            ResponseBodyProj::Recording { inner, recorder } => {
                let polled = ready!(inner.poll_frame(cx));
                match &polled {
                    Some(Ok(frame)) => {
                        if let (Some(data), Some(recorder)) = (frame.data_ref(), recorder.as_mut()) {
                            recorder.record(data);
                        }
                    }
                    // End of stream: emit now rather than whenever the body is dropped.
                    None => drop(recorder.take()),
                    Some(Err(_)) => {}
                }
                Poll::Ready(polled)
            }
            ResponseBodyProj::Rejected { inner } => inner
                .poll_frame(cx)
                .map_err(|never: Infallible| match never {}),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Passthrough { inner } | Self::Recording { inner, .. } => inner.is_end_stream(),
            Self::Rejected { inner } => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Passthrough { inner } | Self::Recording { inner, .. } => inner.size_hint(),
            Self::Rejected { inner } => inner.size_hint(),
        }
    }
}
