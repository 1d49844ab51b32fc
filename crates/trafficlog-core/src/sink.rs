//! Destinations for traffic events
//!
//! A [`TrafficSink`] receives each finished [`TrafficEvent`]. Emission is
//! fire-and-forget: a sink that cannot accept an event reports the failure
//! through `tracing` and drops the event, it never fails the request.
//!
//! # Example
//!
//! ```rust
//! use trafficlog_core::{JsonLinesSink, TrafficLogLayer};
//!
//! // One JSON object per line on stdout
//! let layer = TrafficLogLayer::builder()
//!     .sink(JsonLinesSink::new(std::io::stdout()))
//!     .build();
//! ```

use crate::event::TrafficEvent;
use std::io::Write;
use std::sync::Mutex;
use tracing::Level;

/// Target of the events emitted by [`TracingSink`]
pub const TRACING_TARGET: &str = "traffic_log";

/// Receiver of traffic events
pub trait TrafficSink: Send + Sync + 'static {
    /// Hand over one event. Must not block for long and must not panic.
    fn emit(&self, event: &TrafficEvent);
}

impl<S: TrafficSink + ?Sized> TrafficSink for std::sync::Arc<S> {
    fn emit(&self, event: &TrafficEvent) {
        (**self).emit(event)
    }
}

/// Sink forwarding events to the `tracing` subscriber
///
/// Every event becomes one `tracing` event on the `traffic_log` target with
/// the identity fields as separate values and the request/response parts as
/// JSON text.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    /// Emit at INFO level
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Emit at the given level
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! traffic_event {
    ($level:expr, $event:ident, $request:ident, $response:ident) => {
        tracing::event!(
            target: TRACING_TARGET,
            $level,
            timestamp = $event.timestamp,
            api_name = %$event.api_name,
            ip = %$event.ip,
            operator = %$event.operator,
            latency_ms = $event.latency.as_secs_f64() * 1000.0,
            request = %$request,
            response = %$response,
            "traffic"
        )
    };
}

impl TrafficSink for TracingSink {
    fn emit(&self, event: &TrafficEvent) {
        let request = serde_json::to_string(&event.request).unwrap_or_default();
        let response = serde_json::to_string(&event.response).unwrap_or_default();

        // `tracing` needs the level as a constant at each call site.
        match self.level {
            Level::TRACE => traffic_event!(Level::TRACE, event, request, response),
            Level::DEBUG => traffic_event!(Level::DEBUG, event, request, response),
            Level::INFO => traffic_event!(Level::INFO, event, request, response),
            Level::WARN => traffic_event!(Level::WARN, event, request, response),
            Level::ERROR => traffic_event!(Level::ERROR, event, request, response),
        }
    }
}

/// Sink writing each event as one JSON line
///
/// Each event reaches the writer through a single `write_all` call holding
/// the whole line, so writers that treat every write as one record (such as
/// a list push) receive exactly one event per record.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, event: &TrafficEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.write_all(&line)?;
        writer.flush()
    }
}

impl<W: Write + Send + 'static> TrafficSink for JsonLinesSink<W> {
    fn emit(&self, event: &TrafficEvent) {
        if let Err(err) = self.write_line(event) {
            tracing::warn!(
                api_name = %event.api_name,
                error = %err,
                "Failed to write traffic event"
            );
        }
    }
}

impl<W> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}
