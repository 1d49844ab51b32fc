//! Field extraction for traffic events
//!
//! A [`FieldExtractor`] pulls the identity fields of a traffic event out of
//! the request head: the logical API name (which decides whether the request
//! is logged at all), the host, the client IP and the operator.
//!
//! Absent data is never an error. Every operation returns an empty string
//! when nothing usable is found.
//!
//! # Example
//!
//! ```rust
//! use trafficlog_core::{DefaultExtractor, FieldExtractor};
//!
//! let req = http::Request::builder()
//!     .uri("/orders")
//!     .header("x-api-name", "orders.list")
//!     .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
//!     .body(())
//!     .unwrap();
//! let (parts, _) = req.into_parts();
//!
//! assert_eq!(DefaultExtractor.api_name(&parts), "orders.list");
//! assert_eq!(DefaultExtractor.client_ip(&parts), "203.0.113.9");
//! ```

use http::header::{self, HeaderName};
use http::request::Parts;
use std::net::SocketAddr;

/// Header carrying the API name. An empty or missing value disables logging.
pub const X_API_NAME: HeaderName = HeaderName::from_static("x-api-name");
/// Host as seen by the outermost proxy.
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
/// Client address set by a trusted proxy.
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
/// Proxy chain, client first.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
/// Authenticated user name forwarded by the gateway.
pub const X_FORWARDED_USER_NAME: HeaderName = HeaderName::from_static("x-forwarded-user-name");

/// Transport-level peer address of the connection.
///
/// Servers insert this into the request extensions so that extractors can
/// fall back to it when no proxy header names the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Strategy for pulling event fields out of a request head
///
/// Implementations must be pure functions of the request: no side effects,
/// no failures.
pub trait FieldExtractor: Send + Sync + 'static {
    /// Host the request was addressed to
    fn host(&self, parts: &Parts) -> String;

    /// Address of the originating client
    fn client_ip(&self, parts: &Parts) -> String;

    /// Logical API name; empty means the request is not logged
    fn api_name(&self, parts: &Parts) -> String;

    /// Identity of the operator performing the call
    fn operator(&self, parts: &Parts) -> String;
}

/// Extractor reading the usual reverse-proxy headers
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

impl FieldExtractor for DefaultExtractor {
    fn host(&self, parts: &Parts) -> String {
        let forwarded = header_str(parts, &X_FORWARDED_HOST);
        if !forwarded.is_empty() {
            return forwarded.to_string();
        }

        let host = header_str(parts, &header::HOST);
        if !host.is_empty() {
            return host.to_string();
        }

        parts
            .uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .unwrap_or_default()
    }

    fn client_ip(&self, parts: &Parts) -> String {
        let real_ip = header_str(parts, &X_REAL_IP).trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }

        let forwarded_for = header_str(parts, &X_FORWARDED_FOR)
            .split(',')
            .next()
            .unwrap_or_default()
            .trim();
        if !forwarded_for.is_empty() {
            return forwarded_for.to_string();
        }

        parts
            .extensions
            .get::<PeerAddr>()
            .map(|peer| peer.0.ip().to_string())
            .unwrap_or_default()
    }

    fn api_name(&self, parts: &Parts) -> String {
        header_str(parts, &X_API_NAME).to_string()
    }

    fn operator(&self, parts: &Parts) -> String {
        header_str(parts, &X_FORWARDED_USER_NAME).to_string()
    }
}

/// Header value as text, or `""` when missing or not visible ASCII
fn header_str<'a>(parts: &'a Parts, name: &HeaderName) -> &'a str {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
