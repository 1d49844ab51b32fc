//! Error types for trafficlog

/// Boxed error used for body errors of arbitrary body types
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for trafficlog operations
pub type Result<T, E = TrafficLogError> = std::result::Result<T, E>;

/// Errors raised by the capture pipeline
///
/// None of these ever reach the log sink: a request that fails here is
/// answered directly and produces no traffic event.
#[derive(Debug, thiserror::Error)]
pub enum TrafficLogError {
    /// The inbound request body could not be drained into the capture buffer.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] BoxError),
}

impl TrafficLogError {
    pub(crate) fn body_read(err: impl Into<BoxError>) -> Self {
        Self::BodyRead(err.into())
    }
}
