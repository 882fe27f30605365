//! Normalized request view.
//!
//! The engine does not integrate with any HTTP framework. Callers extract
//! a `RequestView` from their framework's request object and hand it to
//! `DetectionEngine::evaluate`.

use serde_json::Value;
use std::collections::BTreeMap;

/// A framework-agnostic view of one inbound HTTP request.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path, without the query string.
    pub path: String,
    /// Client IP address as reported by the edge.
    pub ip: String,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
    /// Parsed request body, if any. A plain-text body is `Value::String`.
    pub body: Option<Value>,
    /// Request headers. Repeated names are allowed.
    pub headers: Vec<(String, String)>,
}

impl RequestView {
    /// Creates a minimal view with no query, body, or headers.
    #[must_use]
    pub fn new(method: &str, path: &str, ip: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            ip: ip.to_string(),
            ..Self::default()
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_lowercase(), value.to_string()));
        self
    }

    /// Returns the first `User-Agent` header value, if present.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| value.as_str())
    }

    /// Approximate body size in bytes, for history bookkeeping.
    #[must_use]
    pub fn body_size(&self) -> Option<usize> {
        self.body.as_ref().map(|body| match body {
            Value::String(s) => s.len(),
            other => other.to_string().len(),
        })
    }
}
