//! WeChat MP login proxy library.
//!
//! Forwards browser requests to the MP QR-code login API with the required
//! headers and cookies, retrying transient failures, and ships a small
//! key-value store with atomic batches.

pub mod config;
pub mod http;
pub mod kv;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod upstream;

pub use config::AppConfig;
pub use http::HttpServer;
pub use kv::{KvStore, SharedKv};
pub use lifecycle::Shutdown;
pub use upstream::{ProxyClient, ProxyRequest};
