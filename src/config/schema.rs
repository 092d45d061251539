//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the login proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the login proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, request deadline).
    pub listener: ListenerConfig,

    /// Upstream login API settings.
    pub upstream: UpstreamConfig,

    /// Key-value backend selection.
    pub kv: KvConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Hard deadline for a whole inbound request, retries included.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Upstream (WeChat MP) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Login QR-code endpoint.
    pub qrcode_endpoint: String,

    /// Default `Referer` sent with every outbound request.
    pub referer: String,

    /// Default `Origin` sent with every outbound request.
    pub origin: String,

    /// Default desktop browser `User-Agent`.
    pub user_agent: String,

    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,

    /// Total attempts per proxied call (first try included).
    pub max_attempts: u32,

    /// Backoff before attempt `k + 1` is `backoff_base_ms * k`.
    pub backoff_base_ms: u64,

    /// Extra random delay as a fraction of the backoff (0.0 disables jitter).
    pub backoff_jitter_ratio: f64,

    /// Static image served by redirect when upstream answers with zero bytes.
    pub fallback_qrcode_url: String,

    /// What the QR-code endpoint does with a zero-byte upstream image.
    pub empty_payload: EmptyPayloadPolicy,
}

/// Handling of a successful upstream response with an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPayloadPolicy {
    /// Redirect the browser to `fallback_qrcode_url`.
    #[default]
    Redirect,
    /// Answer 500 like any other upstream failure.
    Fail,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            qrcode_endpoint: "https://mp.weixin.qq.com/cgi-bin/scanloginqrcode".to_string(),
            referer: "https://mp.weixin.qq.com/".to_string(),
            origin: "https://mp.weixin.qq.com".to_string(),
            user_agent: crate::upstream::headers::DESKTOP_USER_AGENT.to_string(),
            timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_jitter_ratio: 0.0,
            fallback_qrcode_url:
                "https://mp.weixin.qq.com/misc/getqrcode?param=L3BvdzcvbUNWeDNPdHRmdEtvd2Uz&rand=799"
                    .to_string(),
            empty_payload: EmptyPayloadPolicy::default(),
        }
    }
}

/// Which key-value implementation backs the process-wide store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    /// In-memory fallback with sequential, non-rolling-back commits.
    #[default]
    Memory,
    /// In-memory store with validate-then-apply compare-and-swap commits.
    Transactional,
}

/// Key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KvConfig {
    pub backend: KvBackend,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
