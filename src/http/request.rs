//! Request descriptors consumed by the fetch client.

use std::str::FromStr;
use std::time::Duration;

/// Default per-request timeout, matching the scrapers' historical value.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP methods supported by the fetch client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for Method {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(DescriptorError::InvalidMethod(other.to_string())),
        }
    }
}

/// Request payload. The enum makes "JSON body and form body both set"
/// unrepresentable; `None` on the descriptor means no body at all.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Structured body, sent as `application/json`.
    Json(serde_json::Value),
    /// Form-encoded key/value pairs.
    Form(Vec<(String, String)>),
}

/// Everything needed to issue one HTTP request.
///
/// Query pairs and headers keep insertion order. Per-request headers,
/// when non-empty, replace the client's defaults wholesale rather than
/// merging with them.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Shorthand for the common GET-this-page case.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration defects in a descriptor. These propagate to the caller
/// immediately and are never retried.
#[derive(Debug)]
pub enum DescriptorError {
    /// URL failed to parse.
    InvalidUrl(String),
    /// Header name or value rejected by the HTTP layer.
    InvalidHeader(String),
    /// Unrecognized HTTP method string.
    InvalidMethod(String),
}

impl std::fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            DescriptorError::InvalidHeader(msg) => write!(f, "Invalid header: {}", msg),
            DescriptorError::InvalidMethod(msg) => write!(f, "Invalid HTTP method: {}", msg),
        }
    }
}

impl std::error::Error for DescriptorError {}
