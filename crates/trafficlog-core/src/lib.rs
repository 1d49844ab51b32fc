//! # trafficlog core
//!
//! Request/response traffic capture for HTTP services, as a tower layer.
//!
//! Requests tagged with an API name (the `X-Api-Name` header by default) are
//! recorded: both bodies are copied into pooled buffers while the service and
//! the client see them unchanged, and one [`TrafficEvent`] per request goes to
//! a [`TrafficSink`] once the response has been sent. Untagged requests are
//! not touched.
//!
//! This crate is usually consumed through `trafficlog`, which adds the file
//! and Redis writers.

mod error;
pub mod event;
pub mod extract;
pub mod ignore;
mod layer;
pub mod pool;
mod request;
mod response;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
mod test_utils;

// Public API
pub use error::{BoxError, Result, TrafficLogError};
pub use event::{is_json, scrub_line_breaks, LoggedBody, RequestSnapshot, ResponseSnapshot, TrafficEvent};
pub use extract::{
    DefaultExtractor, FieldExtractor, PeerAddr, X_API_NAME, X_FORWARDED_FOR, X_FORWARDED_HOST,
    X_FORWARDED_USER_NAME, X_REAL_IP,
};
pub use ignore::{CaptureAll, IgnoreAll, IgnoreApis, IgnorePolicy};
pub use layer::{TrafficLogLayer, TrafficLogLayerBuilder, TrafficLogService};
pub use pool::{BufferPool, ObjectPool, PoolStats, Pooled, Reusable};
pub use request::{drain_into, RequestBody};
pub use response::{Recorder, ResponseBody};
pub use sink::{JsonLinesSink, TracingSink, TrafficSink};
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{FailingBody, MemorySink};
