//! Request body capture
//!
//! When the request body of a logged call is captured, the original body is
//! drained into a pooled buffer before the inner service runs, and the inner
//! service receives a [`RequestBody::Replay`] carrying the same bytes. The
//! downstream handler reads the body from the start, in full, without any
//! sign that it was read before.

use crate::error::{BoxError, Result, TrafficLogError};
use bytes::{BufMut, Bytes};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::{pin, Pin};
use std::task::{Context, Poll};

/// Read every data frame of `body` into `buffer`.
///
/// Trailers are discarded. The body is dropped once drained or on the first
/// error.
pub async fn drain_into<B>(body: B, buffer: &mut Vec<u8>) -> Result<()>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let mut body = pin!(body);
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(TrafficLogError::body_read)?;
        if let Ok(data) = frame.into_data() {
            buffer.put(data);
        }
    }
    Ok(())
}

pin_project! {
    /// Request body seen by the service behind the traffic logger
    #[project = RequestBodyProj]
    pub enum RequestBody<B> {
        /// The original body, untouched
        Passthrough {
            #[pin]
            inner: B,
        },
        /// Bytes captured from the original body, yielded once
        Replay {
            data: Option<Bytes>,
        },
    }
}

impl<B> RequestBody<B> {
    /// Forward the original body as is
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Replay captured bytes. An empty capture ends the stream right away.
    pub fn replay(captured: &[u8]) -> Self {
        let data = (!captured.is_empty()).then(|| Bytes::copy_from_slice(captured));
        Self::Replay { data }
    }

    /// Whether the body is replayed from a capture
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replay { .. })
    }
}

impl<B> Body for RequestBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            RequestBodyProj::Passthrough { inner } => inner.poll_frame(cx),
            RequestBodyProj::Replay { data } => Poll::Ready(data.take().map(|data| Ok(Frame::data(data)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Passthrough { inner } => inner.is_end_stream(),
            Self::Replay { data } => data.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Passthrough { inner } => inner.size_hint(),
            Self::Replay { data } => {
                SizeHint::with_exact(data.as_ref().map_or(0, |data| data.len() as u64))
            }
        }
    }
}
