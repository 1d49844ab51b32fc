//! Sink selection from the environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TRAFFIC_LOG_SINK` | `tracing` | `tracing`, `file` or `redis` |
//! | `TRAFFIC_LOG_DIR` | `logs` | directory of the file sink |
//! | `TRAFFIC_LOG_NAME` | `traffic` | file name (without `.log`) of the file sink |
//! | `TRAFFIC_LOG_REDIS_URL` | `redis://127.0.0.1/` | server of the Redis sink |
//! | `TRAFFIC_LOG_REDIS_KEY` | `traffic_log` | list the Redis sink pushes onto |
//! | `TRAFFIC_LOG_IGNORE_BODIES` | `false` | leave every body out of the events |
//!
//! Values from a `.env` file are used when the variable is not already set.

use crate::error::{Result, WriterError};
use crate::file::FileWriter;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use trafficlog_core::{CaptureAll, IgnoreAll, IgnorePolicy, JsonLinesSink, TracingSink, TrafficSink};

const ENV_PREFIX: &str = "TRAFFIC_LOG_";

/// Which destination events go to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Tracing,
    File,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub sink: SinkKind,
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_key")]
    pub redis_key: String,
    #[serde(default)]
    pub ignore_bodies: bool,
}

fn default_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_name() -> String {
    "traffic".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1/".to_string()
}

fn default_redis_key() -> String {
    "traffic_log".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            dir: default_dir(),
            name: default_name(),
            redis_url: default_redis_url(),
            redis_key: default_redis_key(),
            ignore_bodies: false,
        }
    }
}

impl SinkConfig {
    /// Load `.env`, then read the `TRAFFIC_LOG_*` variables
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "Failed to load .env file");
            }
        }
        envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .map_err(|err| WriterError::Config(err.to_string()))
    }

    /// Read the `TRAFFIC_LOG_*` entries of an explicit variable list
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .map_err(|err| WriterError::Config(err.to_string()))
    }

    /// Open the configured sink
    pub async fn build(&self) -> Result<Arc<dyn TrafficSink>> {
        let sink: Arc<dyn TrafficSink> = match self.sink {
            SinkKind::Tracing => Arc::new(TracingSink::new()),
            SinkKind::File => Arc::new(JsonLinesSink::new(FileWriter::open(&self.dir, &self.name)?)),
            SinkKind::Redis => self.redis_sink().await?,
        };
        tracing::info!(sink = ?self.sink, "Traffic log sink ready");
        Ok(sink)
    }

    #[cfg(feature = "redis")]
    async fn redis_sink(&self) -> Result<Arc<dyn TrafficSink>> {
        let sink = crate::redis::RedisListSink::connect(&self.redis_url, self.redis_key.clone()).await?;
        Ok(Arc::new(sink))
    }

    #[cfg(not(feature = "redis"))]
    async fn redis_sink(&self) -> Result<Arc<dyn TrafficSink>> {
        Err(WriterError::Config(
            "the redis sink needs the `redis` feature".to_string(),
        ))
    }

    /// Body capture policy matching `ignore_bodies`
    pub fn ignore_policy(&self) -> Arc<dyn IgnorePolicy> {
        if self.ignore_bodies {
            Arc::new(IgnoreAll)
        } else {
            Arc::new(CaptureAll)
        }
    }
}
