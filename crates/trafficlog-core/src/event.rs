//! Traffic event model
//!
//! One [`TrafficEvent`] is produced per logged request. It serializes to a
//! single-line JSON object:
//!
//! ```json
//! {
//!   "timestamp": 1718000000,
//!   "api_name": "orders.get",
//!   "ip": "203.0.113.9",
//!   "operator": "alice",
//!   "latency": 1.734,
//!   "request": {"method": "POST", "host": "api.example.com", "path": "/orders", "query": "id=7", "body": {"id": 7}},
//!   "response": {"status": 200, "body": {"ok": true}}
//! }
//! ```
//!
//! `latency` is expressed in milliseconds. Bodies that are valid JSON are
//! embedded as JSON values; anything else is logged as a string. Empty or
//! uncaptured bodies are left out.

use bytes::Bytes;
use serde::de::IgnoredAny;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use std::time::Duration;

/// Structured record of one request/response exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficEvent {
    /// Request start, seconds since the Unix epoch
    pub timestamp: i64,
    /// API name the request was tagged with
    pub api_name: String,
    /// Client address
    pub ip: String,
    /// Operator identity
    pub operator: String,
    /// Time from entering the middleware to emitting the event
    #[serde(serialize_with = "serialize_millis")]
    pub latency: Duration,
    /// Request side of the exchange
    pub request: RequestSnapshot,
    /// Response side of the exchange
    pub response: ResponseSnapshot,
}

/// Request fields of a [`TrafficEvent`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<LoggedBody>,
}

/// Response fields of a [`TrafficEvent`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<LoggedBody>,
}

/// A captured body as it appears in the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggedBody {
    /// Well-formed JSON with line breaks replaced by spaces
    Json(String),
    /// Anything else, kept byte for byte
    Opaque(Bytes),
}

impl LoggedBody {
    /// Turn captured bytes into an event body.
    ///
    /// Returns `None` for an empty capture. When the bytes are well-formed
    /// JSON, every `\n` and `\r` in `captured` is replaced by a space in
    /// place before the text is taken.
    pub fn from_captured(captured: &mut [u8]) -> Option<Self> {
        if captured.is_empty() {
            return None;
        }
        if !is_json(captured) {
            return Some(Self::Opaque(Bytes::copy_from_slice(captured)));
        }

        scrub_line_breaks(captured);
        // Only ASCII bytes were replaced, the text is still valid UTF-8.
        Some(Self::Json(String::from_utf8_lossy(captured).into_owned()))
    }

    /// Raw bytes of the body
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Json(text) => text.as_bytes(),
            Self::Opaque(bytes) => bytes,
        }
    }
}

impl Serialize for LoggedBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(text) => {
                let raw: &RawValue = serde_json::from_str(text).map_err(S::Error::custom)?;
                raw.serialize(serializer)
            }
            Self::Opaque(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

/// Replace every `\n` and `\r` byte with a space.
///
/// Applying it twice gives the same bytes as applying it once.
pub fn scrub_line_breaks(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        if *byte == b'\n' || *byte == b'\r' {
            *byte = b' ';
        }
    }
}

/// Whether `bytes` hold exactly one JSON value, surrounding whitespace allowed
pub fn is_json(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes)
        .map(|text| serde_json::from_str::<IgnoredAny>(text).is_ok())
        .unwrap_or(false)
}

fn serialize_millis<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_nanos() as f64 / 1_000_000.0)
}
