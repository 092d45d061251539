//! Proxy request descriptors, responses and error definitions.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;

use crate::upstream::headers::CookieJar;

/// Per-attempt deadline used when a request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Attempts per call used when a request does not set a count.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Methods the upstream login API is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl ProxyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMethod::Get => "GET",
            ProxyMethod::Post => "POST",
            ProxyMethod::Put => "PUT",
            ProxyMethod::Patch => "PATCH",
            ProxyMethod::Delete => "DELETE",
        }
    }
}

impl From<ProxyMethod> for reqwest::Method {
    fn from(method: ProxyMethod) -> Self {
        match method {
            ProxyMethod::Get => reqwest::Method::GET,
            ProxyMethod::Post => reqwest::Method::POST,
            ProxyMethod::Put => reqwest::Method::PUT,
            ProxyMethod::Patch => reqwest::Method::PATCH,
            ProxyMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query or form value: text or a number.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Text(s) => f.write_str(s),
            QueryValue::Integer(n) => write!(f, "{}", n),
            QueryValue::Float(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Integer(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Integer(value.into())
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Integer(value.into())
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Float(value)
    }
}

/// Ordered key/value pairs; `None` values are skipped when encoding.
pub type Params = Vec<(String, Option<QueryValue>)>;

/// Everything needed to proxy one logical call to the upstream API.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub endpoint: String,
    pub method: ProxyMethod,
    pub query: Option<Params>,
    /// Form body; only sent for POST.
    pub body: Option<Params>,
    /// Caller headers, applied last so they win over defaults and the cookie.
    pub headers: Vec<(String, String)>,
    pub parse_json: bool,
    pub with_credentials: bool,
    /// Cookies forwarded from the inbound browser request.
    pub cookies: CookieJar,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl ProxyRequest {
    pub fn new(method: ProxyMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            query: None,
            body: None,
            headers: Vec::new(),
            parse_json: false,
            with_credentials: true,
            cookies: CookieJar::default(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(ProxyMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(ProxyMethod::Post, endpoint)
    }

    /// Append a query parameter, preserving insertion order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query
            .get_or_insert_with(Vec::new)
            .push((key.into(), Some(value.into())));
        self
    }

    /// Append a query parameter that is omitted when `value` is `None`.
    pub fn query_opt(mut self, key: impl Into<String>, value: Option<QueryValue>) -> Self {
        self.query.get_or_insert_with(Vec::new).push((key.into(), value));
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.body
            .get_or_insert_with(Vec::new)
            .push((key.into(), Some(value.into())));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    /// Per-attempt deadline; zero falls back to the default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts; zero falls back to the default.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Deadline actually applied to each attempt.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Attempt budget actually used by the client.
    pub fn effective_max_attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts
        }
    }
}

/// A fully composed request ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: ProxyMethod,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Fail with `UpstreamStatus` unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, ProxyError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ProxyError::UpstreamStatus(self.status))
        }
    }

    /// Best-effort UTF-8 view of the body for logging.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What a successful proxy call yields.
#[derive(Debug, Clone)]
pub enum ProxyOutput {
    Raw(UpstreamResponse),
    Json(serde_json::Value),
}

impl ProxyOutput {
    pub fn into_raw(self) -> Option<UpstreamResponse> {
        match self {
            ProxyOutput::Raw(response) => Some(response),
            ProxyOutput::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            ProxyOutput::Json(value) => Some(value),
            ProxyOutput::Raw(_) => None,
        }
    }
}

/// A single attempt failed before any response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The per-attempt deadline elapsed and the call was cancelled.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// DNS, connect, TLS or read failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Errors surfaced by the proxy client and its callers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The descriptor could not be turned into a request.
    #[error("invalid proxy request: {0}")]
    InvalidRequest(String),

    /// Every attempt failed at the transport level.
    #[error("all {attempts} attempts failed: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: FetchError,
    },

    /// Upstream answered with a non-2xx status.
    #[error("WeChat API returned {}", .0.as_u16())]
    UpstreamStatus(StatusCode),

    /// Upstream answered 2xx with an empty body.
    #[error("upstream returned an empty payload")]
    EmptyPayload,

    /// The body was not valid JSON.
    #[error("failed to decode upstream JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
