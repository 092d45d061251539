//! Timeout-bounded fetching.
//!
//! # Responsibilities
//! - Define the transport seam the proxy client sends through
//! - Issue one request with a hard deadline
//! - Keep timeouts and network failures distinguishable
//!
//! # Design Decisions
//! - The body is read inside the deadline; a slow body is a timeout, not a success
//! - No cookie store on the reqwest client; cookies come only from the caller's jar

use async_trait::async_trait;
use std::time::Duration;

use crate::resilience::timeouts::with_deadline;
use crate::upstream::types::{FetchError, OutboundRequest, UpstreamResponse};

/// Sends one fully composed request and buffers the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(UpstreamResponse { status, headers, body })
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    FetchError::Network(e.to_string())
}

/// Send `request` through `transport`, cancelling it once `timeout` elapses.
pub async fn fetch_with_timeout(
    transport: &dyn Transport,
    request: OutboundRequest,
    timeout: Duration,
) -> Result<UpstreamResponse, FetchError> {
    match with_deadline(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(elapsed) => Err(FetchError::Timeout(elapsed.0)),
    }
}
