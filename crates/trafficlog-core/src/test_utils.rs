//! Helpers for testing code that uses the traffic logger
//!
//! Available in this crate's own tests and, to dependents, behind the
//! `test-utils` feature.

use crate::event::TrafficEvent;
use crate::sink::TrafficSink;
use bytes::Bytes;
use hyper::body::{Body, Frame};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Sink keeping every event in memory
///
/// Clones share the same storage, so a test can keep one clone and hand the
/// other to the layer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TrafficEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<TrafficEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrafficSink for MemorySink {
    fn emit(&self, event: &TrafficEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Request body that yields some bytes and then fails
#[derive(Debug)]
pub struct FailingBody {
    data: Option<Bytes>,
    failed: bool,
}

impl FailingBody {
    /// Yield `data` as one frame, then a connection reset error
    pub fn after(data: &'static [u8]) -> Self {
        Self {
            data: (!data.is_empty()).then(|| Bytes::from_static(data)),
            failed: false,
        }
    }
}

impl Body for FailingBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(data) = self.data.take() {
            return Poll::Ready(Some(Ok(Frame::data(data))));
        }
        if self.failed {
            return Poll::Ready(None);
        }
        self.failed = true;
        Poll::Ready(Some(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "client disconnected",
        ))))
    }
}
