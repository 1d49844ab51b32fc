//! Redis list destination
//!
//! Each event is pushed with `LPUSH` onto a list, newest first, as one JSON
//! document per element. Pushes run on the ambient tokio runtime and never
//! hold up the response that produced the event.

use crate::error::Result;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use trafficlog_core::{TrafficEvent, TrafficSink};

/// Sink pushing traffic events onto a Redis list
#[derive(Clone)]
pub struct RedisListSink {
    connection: MultiplexedConnection,
    key: String,
}

impl RedisListSink {
    /// Connect to `url` and push onto the list at `key`
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::with_connection(connection, key))
    }

    /// Reuse an existing connection
    pub fn with_connection(connection: MultiplexedConnection, key: impl Into<String>) -> Self {
        Self {
            connection,
            key: key.into(),
        }
    }

    /// Key of the list events are pushed onto
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl TrafficSink for RedisListSink {
    fn emit(&self, event: &TrafficEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(api_name = %event.api_name, error = %err, "Failed to serialize traffic event");
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(api_name = %event.api_name, "No tokio runtime, traffic event dropped");
                return;
            }
        };

        let mut connection = self.connection.clone();
        let key = self.key.clone();
        let api_name = event.api_name.clone();
        runtime.spawn(async move {
            if let Err(err) = connection.lpush::<_, _, ()>(&key, payload).await {
                tracing::warn!(api_name = %api_name, key = %key, error = %err, "Failed to push traffic event");
            }
        });
    }
}

impl std::fmt::Debug for RedisListSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisListSink")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
