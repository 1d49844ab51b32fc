//! Per-API body capture policy
//!
//! An [`IgnorePolicy`] decides, from the API name alone, whether the request
//! body and the response body of a call are left out of its traffic event.
//! The rest of the event (method, path, status, latency...) is always logged.

use std::collections::HashSet;

/// Decides which bodies are skipped for an API name
///
/// Must depend on `api_name` only.
pub trait IgnorePolicy: Send + Sync + 'static {
    /// `true` when the request body of `api_name` must not be captured
    fn ignore_request(&self, api_name: &str) -> bool;

    /// `true` when the response body of `api_name` must not be captured
    fn ignore_response(&self, api_name: &str) -> bool;
}

/// Capture every body (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureAll;

impl IgnorePolicy for CaptureAll {
    fn ignore_request(&self, _api_name: &str) -> bool {
        false
    }

    fn ignore_response(&self, _api_name: &str) -> bool {
        false
    }
}

/// Never capture bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreAll;

impl IgnorePolicy for IgnoreAll {
    fn ignore_request(&self, _api_name: &str) -> bool {
        true
    }

    fn ignore_response(&self, _api_name: &str) -> bool {
        true
    }
}

/// Skip bodies for a fixed set of API names
///
/// # Example
///
/// ```rust
/// use trafficlog_core::{IgnoreApis, IgnorePolicy};
///
/// let policy = IgnoreApis::new()
///     .request("users.login")
///     .response("reports.export")
///     .both("files.upload");
///
/// assert!(policy.ignore_request("users.login"));
/// assert!(!policy.ignore_response("users.login"));
/// assert!(policy.ignore_response("files.upload"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct IgnoreApis {
    request: HashSet<String>,
    response: HashSet<String>,
}

impl IgnoreApis {
    /// Create a policy that ignores nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the request body of `api_name`
    pub fn request(mut self, api_name: impl Into<String>) -> Self {
        self.request.insert(api_name.into());
        self
    }

    /// Skip the response body of `api_name`
    pub fn response(mut self, api_name: impl Into<String>) -> Self {
        self.response.insert(api_name.into());
        self
    }

    /// Skip both bodies of `api_name`
    pub fn both(self, api_name: impl Into<String>) -> Self {
        let api_name = api_name.into();
        self.request(api_name.clone()).response(api_name)
    }
}

impl IgnorePolicy for IgnoreApis {
    fn ignore_request(&self, api_name: &str) -> bool {
        self.request.contains(api_name)
    }

    fn ignore_response(&self, api_name: &str) -> bool {
        self.response.contains(api_name)
    }
}
