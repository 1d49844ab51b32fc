//! # trafficlog
//!
//! Traffic logging for HTTP services built on `tower` and `hyper`.
//!
//! Add [`TrafficLogLayer`] in front of a service and every request carrying an
//! `X-Api-Name` header produces one structured event: who called, what was
//! sent, what came back and how long it took. Requests without the header go
//! through untouched.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trafficlog::prelude::*;
//!
//! let sink = JsonLinesSink::new(FileWriter::open("logs", "traffic")?);
//! let service = tower::ServiceBuilder::new()
//!     .layer(
//!         TrafficLogLayer::builder()
//!             .sink(sink)
//!             .ignore(IgnoreApis::new().both("files.upload"))
//!             .build(),
//!     )
//!     .service(app);
//! ```
//!
//! ## Optional Features
//!
//! - `writers` (default) - the rotating file writer
//! - `redis` - Redis list sink
//! - `config` - sink selection from `TRAFFIC_LOG_*` variables and `.env`
//! - `test-utils` - in-memory sink and failing request body for tests
//! - `full` - all of the above except `test-utils`

pub use trafficlog_core::*;

#[cfg(feature = "writers")]
pub use trafficlog_writers as writers;
#[cfg(feature = "writers")]
pub use trafficlog_writers::{FileWriter, WriterError};
#[cfg(feature = "redis")]
pub use trafficlog_writers::RedisListSink;
#[cfg(feature = "config")]
pub use trafficlog_writers::{SinkConfig, SinkKind};

/// Prelude module - `use trafficlog::prelude::*`
pub mod prelude {
    pub use trafficlog_core::{
        CaptureAll, DefaultExtractor, FieldExtractor, IgnoreAll, IgnoreApis, IgnorePolicy,
        JsonLinesSink, LoggedBody, PeerAddr, RequestBody, ResponseBody, TracingSink,
        TrafficEvent, TrafficLogLayer, TrafficSink,
    };

    #[cfg(feature = "writers")]
    pub use trafficlog_writers::FileWriter;
    #[cfg(feature = "redis")]
    pub use trafficlog_writers::RedisListSink;
    #[cfg(feature = "config")]
    pub use trafficlog_writers::SinkConfig;

    pub use tower::{Layer, ServiceBuilder};
}
