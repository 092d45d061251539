//! Outbound header composition.
//!
//! # Responsibilities
//! - Provide the default browser identity (Referer, Origin, User-Agent)
//! - Turn inbound browser cookies into an outbound `Cookie` header
//! - Apply caller headers last so they win every conflict
//!
//! # Design Decisions
//! - Header names compare case-insensitively; later inserts replace earlier ones
//! - Cookie values are never logged, only the header length

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, ORIGIN, REFERER, USER_AGENT};

use crate::upstream::types::{ProxyError, ProxyResult};

/// Chrome 119 on Windows 10.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// The identity every outbound request starts from.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    pub referer: String,
    pub origin: String,
    pub user_agent: String,
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        Self {
            referer: "https://mp.weixin.qq.com/".to_string(),
            origin: "https://mp.weixin.qq.com".to_string(),
            user_agent: DESKTOP_USER_AGENT.to_string(),
        }
    }
}

/// Ordered cookie name/value pairs taken from a browser request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    /// Parse every `Cookie` header in `headers`. The first occurrence of a name wins.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::default();
        for value in headers.get_all(COOKIE) {
            if let Ok(raw) = value.to_str() {
                jar.extend_from_str(raw);
            }
        }
        jar
    }

    /// Parse a single `name=value; name2=value2` string.
    pub fn parse(raw: &str) -> Self {
        let mut jar = Self::default();
        jar.extend_from_str(raw);
        jar
    }

    /// Values are kept percent-encoded as received so they stay valid header bytes.
    fn extend_from_str(&mut self, raw: &str) {
        for part in raw.split(';') {
            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || self.get(name).is_some() {
                continue;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            self.pairs.push((name.to_string(), value.to_string()));
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| *n == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `name=value` pairs joined with `;`, in jar order.
    pub fn to_header_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Build the outbound header map: defaults, then the synthesized cookie, then caller headers.
pub fn compose_headers(
    defaults: &DefaultHeaders,
    cookies: Option<&CookieJar>,
    caller: &[(String, String)],
) -> ProxyResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(REFERER, header_value(&defaults.referer)?);
    headers.insert(ORIGIN, header_value(&defaults.origin)?);
    headers.insert(USER_AGENT, header_value(&defaults.user_agent)?);

    if let Some(jar) = cookies {
        let cookie = jar.to_header_string();
        tracing::debug!(cookie_len = cookie.len(), "Forwarding browser cookies");
        if !cookie.is_empty() {
            headers.insert(COOKIE, header_value(&cookie)?);
        }
    }

    for (name, value) in caller {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProxyError::InvalidRequest(format!("header name '{}': {}", name, e)))?;
        headers.insert(name, header_value(value)?);
    }

    Ok(headers)
}

fn header_value(value: &str) -> ProxyResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::InvalidRequest(format!("header value: {}", e)))
}
