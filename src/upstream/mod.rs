//! Upstream login API client subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (endpoint, query, form, caller headers, cookie jar)
//!     → headers.rs (defaults → Cookie → caller headers)
//!     → client.rs (URL + form encoding, attempt loop)
//!     → fetcher.rs (one attempt, hard deadline)
//!     → ProxyOutput::Raw(UpstreamResponse) | ProxyOutput::Json(Value)
//! ```

pub mod client;
pub mod fetcher;
pub mod headers;
pub mod types;

pub use client::{ProxyClient, RetryPolicy};
pub use fetcher::{fetch_with_timeout, ReqwestTransport, Transport};
pub use headers::{CookieJar, DefaultHeaders};
pub use types::{
    FetchError, OutboundRequest, ProxyError, ProxyMethod, ProxyOutput, ProxyRequest, ProxyResult,
    QueryValue, UpstreamResponse,
};
