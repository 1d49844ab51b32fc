//! # trafficlog writers
//!
//! Destinations for traffic events beyond the `tracing` default:
//!
//! - [`FileWriter`]: a local JSON lines file, rotated on every start
//! - `RedisListSink` (feature `redis`): pushes each event onto a Redis list
//! - `SinkConfig` (feature `config`): picks one of them from the environment

mod error;
pub mod file;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "config")]
pub mod config;

pub use error::{Result, WriterError};
pub use file::FileWriter;
#[cfg(feature = "redis")]
pub use crate::redis::RedisListSink;
#[cfg(feature = "config")]
pub use config::{SinkConfig, SinkKind};
