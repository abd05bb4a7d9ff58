//! The request shape the signer operates on.

use bytes::Bytes;
use http::Method;
use url::Url;

/// An outgoing request before (or after) signing.
///
/// Query parameters are kept exactly as the caller encoded them; the signer
/// never re-encodes them. Headers may repeat a name; repeated values are
/// folded together during canonicalization.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    target_host: Option<String>,
}

impl SignableRequest {
    /// Create a request for `url`, taking path, raw query and target host from it.
    pub fn new(method: Method, url: &Url) -> Self {
        let target_host = url.host_str().map(|host| match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        });

        Self {
            method,
            path: url.path().to_string(),
            query: url.query().map(parse_raw_query).unwrap_or_default(),
            headers: Vec::new(),
            body: None,
            target_host,
        }
    }

    /// Create a request from its parts, with no target host.
    pub fn from_parts(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            target_host: None,
        }
    }

    /// Set the host the request is addressed to.
    pub fn with_target_host(mut self, host: impl Into<String>) -> Self {
        self.target_host = Some(host.into());
        self
    }

    /// Append a query parameter, already encoded.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Body, if one was set.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Host the request is addressed to.
    pub fn target_host(&self) -> Option<&str> {
        self.target_host.as_deref()
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header is present (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub(crate) fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub(crate) fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub(crate) fn into_parts(self) -> (Method, Vec<(String, String)>, Option<Bytes>) {
        (self.method, self.headers, self.body)
    }
}

/// Split a raw query string into pairs without decoding.
///
/// A bare key (`?acl`) and an empty value (`?acl=`) both yield `("acl", "")`.
fn parse_raw_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (key.to_string(), value.to_string())
        })
        .collect()
}
