//! Retrying proxy client.
//!
//! # Responsibilities
//! - Compose headers, URL and form body from a `ProxyRequest`
//! - Drive sequential attempts through the timeout-bounded fetcher
//! - Retry 5xx responses and transport failures with linear backoff
//! - Hand back the raw response or its decoded JSON body
//!
//! # Design Decisions
//! - 4xx responses are returned on the first attempt; status checks belong to the caller
//! - The final attempt's response is returned even if it is still 5xx
//! - JSON decode failures propagate immediately and are never retried

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use url::Url;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::upstream::fetcher::{fetch_with_timeout, ReqwestTransport, Transport};
use crate::upstream::headers::{compose_headers, DefaultHeaders};
use crate::upstream::types::{
    OutboundRequest, Params, ProxyError, ProxyMethod, ProxyOutput, ProxyRequest, ProxyResult,
    UpstreamResponse,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff_base: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(1_000),
            jitter_ratio: 0.0,
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.backoff_base, self.jitter_ratio)
    }
}

/// Client that forwards requests to the upstream login API.
#[derive(Clone)]
pub struct ProxyClient {
    transport: Arc<dyn Transport>,
    defaults: DefaultHeaders,
    retry: RetryPolicy,
}

impl ProxyClient {
    pub fn new(transport: Arc<dyn Transport>, defaults: DefaultHeaders, retry: RetryPolicy) -> Self {
        Self {
            transport,
            defaults,
            retry,
        }
    }

    /// Build a client with a `reqwest` transport and the configured identity.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let transport = Arc::new(ReqwestTransport::new()?);
        let defaults = DefaultHeaders {
            referer: config.referer.clone(),
            origin: config.origin.clone(),
            user_agent: config.user_agent.clone(),
        };
        let retry = RetryPolicy {
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            jitter_ratio: config.backoff_jitter_ratio,
        };
        Ok(Self::new(transport, defaults, retry))
    }

    /// Turn a descriptor into the request every attempt will send.
    pub fn build_outbound(&self, request: &ProxyRequest) -> ProxyResult<OutboundRequest> {
        let mut url = Url::parse(&request.endpoint).map_err(|e| {
            ProxyError::InvalidRequest(format!("endpoint '{}': {}", request.endpoint, e))
        })?;
        if let Some(query) = &request.query {
            if query.iter().any(|(_, v)| v.is_some()) {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in present(query) {
                    pairs.append_pair(key, &value);
                }
            }
        }

        let cookies = request.with_credentials.then_some(&request.cookies);
        let mut headers = compose_headers(&self.defaults, cookies, &request.headers)?;

        let body = match (&request.method, &request.body) {
            (ProxyMethod::Post, Some(form)) => {
                let encoded = encode_form(form);
                tracing::debug!(body_len = encoded.len(), "Request has form body");
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
                }
                Some(Bytes::from(encoded))
            }
            _ => None,
        };

        Ok(OutboundRequest {
            method: request.method,
            url,
            headers,
            body,
        })
    }

    /// Proxy one logical call, retrying 5xx responses and transport failures.
    pub async fn proxy(&self, request: ProxyRequest) -> ProxyResult<ProxyOutput> {
        let outbound = self.build_outbound(&request)?;
        let max_attempts = request.effective_max_attempts();
        let timeout = request.effective_timeout();

        tracing::debug!(
            method = %request.method,
            url = %outbound.url,
            max_attempts,
            timeout_ms = timeout.as_millis() as u64,
            "Proxying upstream request"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let is_last = attempt >= max_attempts;
            tracing::debug!(attempt, max_attempts, "Sending attempt");

            match fetch_with_timeout(self.transport.as_ref(), outbound.clone(), timeout).await {
                Ok(response) if response.status.is_server_error() && !is_last => {
                    metrics::record_attempt("server_error");
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        status = %response.status,
                        delay_ms = delay.as_millis() as u64,
                        "Upstream server error, will retry"
                    );
                    metrics::record_retry("status");
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    metrics::record_attempt("response");
                    tracing::debug!(
                        attempt,
                        status = %response.status,
                        body_len = response.body.len(),
                        "Upstream response received"
                    );
                    return finish(response, request.parse_json);
                }
                Err(e) if is_last => {
                    metrics::record_attempt("transport_error");
                    metrics::record_exhausted();
                    tracing::error!(attempts = attempt, error = %e, "All retry attempts failed");
                    return Err(ProxyError::ExhaustedRetries {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    metrics::record_attempt("transport_error");
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Upstream fetch failed, retrying"
                    );
                    metrics::record_retry("transport");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn finish(response: UpstreamResponse, parse_json: bool) -> ProxyResult<ProxyOutput> {
    if parse_json {
        let value = serde_json::from_slice(&response.body)?;
        Ok(ProxyOutput::Json(value))
    } else {
        Ok(ProxyOutput::Raw(response))
    }
}

fn present(params: &Params) -> impl Iterator<Item = (&str, String)> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v.to_string())))
}

fn encode_form(params: &Params) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in present(params) {
        serializer.append_pair(key, &value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::header::{HeaderMap, COOKIE, REFERER, USER_AGENT};
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    use crate::upstream::headers::CookieJar;
    use crate::upstream::types::{FetchError, DEFAULT_MAX_ATTEMPTS};

    enum Step {
        Status(u16, &'static str),
        Fail,
        Hang,
        Delayed(Duration, u16),
    }

    /// Plays back a fixed script of outcomes and records when each attempt started.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        started: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                started: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.started.lock().unwrap().len()
        }

        /// Gaps between consecutive attempt starts.
        fn gaps(&self) -> Vec<Duration> {
            let started = self.started.lock().unwrap();
            started.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, _request: OutboundRequest) -> Result<UpstreamResponse, FetchError> {
            self.started.lock().unwrap().push(Instant::now());
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
            match step {
                Step::Status(code, body) => Ok(UpstreamResponse {
                    status: StatusCode::from_u16(code).unwrap(),
                    headers: HeaderMap::new(),
                    body: Bytes::from_static(body.as_bytes()),
                }),
                Step::Fail => Err(FetchError::Network("connection refused".into())),
                Step::Hang => std::future::pending().await,
                Step::Delayed(delay, code) => {
                    tokio::time::sleep(delay).await;
                    Ok(UpstreamResponse {
                        status: StatusCode::from_u16(code).unwrap(),
                        headers: HeaderMap::new(),
                        body: Bytes::new(),
                    })
                }
            }
        }
    }

    fn client(transport: Arc<Scripted>) -> ProxyClient {
        ProxyClient::new(transport, DefaultHeaders::default(), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_503_returns_final_response() {
        let transport = Scripted::new(vec![
            Step::Status(503, "a"),
            Step::Status(503, "b"),
            Step::Status(503, "c"),
            Step::Status(503, "d"),
        ]);
        let output = client(transport.clone())
            .proxy(ProxyRequest::get("http://upstream.test/").max_attempts(4))
            .await
            .unwrap();

        let response = output.into_raw().unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.body[..], b"d");
        assert_eq!(transport.attempts(), 4);
        assert_eq!(
            transport.gaps(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transport_failures() {
        let transport = Scripted::new(vec![Step::Fail, Step::Fail, Step::Status(200, "img")]);
        let start = Instant::now();
        let output = client(transport.clone())
            .proxy(ProxyRequest::get("http://upstream.test/"))
            .await
            .unwrap();

        assert_eq!(output.into_raw().unwrap().status, StatusCode::OK);
        assert_eq!(transport.attempts(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1000 + 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upstream_exhausts_retries() {
        let transport = Scripted::new(vec![Step::Hang, Step::Hang, Step::Hang]);
        let start = Instant::now();
        let err = client(transport.clone())
            .proxy(ProxyRequest::get("http://upstream.test/").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();

        match err {
            ProxyError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last, FetchError::Timeout(Duration::from_millis(500)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.attempts(), 3);
        // three timeouts plus the 1s and 2s backoffs between them
        assert_eq!(start.elapsed(), Duration::from_millis(3 * 500 + 1000 + 2000));
        assert_eq!(
            transport.gaps(),
            vec![Duration::from_millis(1500), Duration::from_millis(2500)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_field_uses_default_budget() {
        let transport = Scripted::new(vec![
            Step::Status(503, "a"),
            Step::Status(503, "b"),
            Step::Status(503, "c"),
        ]);
        let request = ProxyRequest {
            max_attempts: 0,
            ..ProxyRequest::get("http://upstream.test/")
        };
        let response = client(transport.clone())
            .proxy(request)
            .await
            .unwrap()
            .into_raw()
            .unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.attempts(), DEFAULT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_field_uses_default_deadline() {
        let transport = Scripted::new(vec![Step::Delayed(Duration::from_millis(5), 200)]);
        let request = ProxyRequest {
            timeout: Duration::ZERO,
            ..ProxyRequest::get("http://upstream.test/")
        };
        let response = client(transport.clone())
            .proxy(request)
            .await
            .unwrap()
            .into_raw()
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let transport = Scripted::new(vec![Step::Status(404, "missing"), Step::Status(200, "")]);
        let output = client(transport.clone())
            .proxy(ProxyRequest::get("http://upstream.test/"))
            .await
            .unwrap();

        assert_eq!(output.into_raw().unwrap().status, StatusCode::NOT_FOUND);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_output_and_decode_failure() {
        let transport = Scripted::new(vec![Step::Status(200, r#"{"base_resp":{"ret":0}}"#)]);
        let value = client(transport)
            .proxy(ProxyRequest::get("http://upstream.test/").parse_json(true))
            .await
            .unwrap()
            .into_json()
            .unwrap();
        assert_eq!(value["base_resp"]["ret"], 0);

        let transport = Scripted::new(vec![Step::Status(200, "<html>"), Step::Status(200, "{}")]);
        let err = client(transport.clone())
            .proxy(ProxyRequest::get("http://upstream.test/").parse_json(true))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Decode(_)));
        assert_eq!(transport.attempts(), 1);
    }

    #[test]
    fn test_query_encoding_preserves_order() {
        let client = client(Scripted::new(vec![]));
        let request = ProxyRequest::get("https://mp.weixin.qq.com/cgi-bin/scanloginqrcode")
            .query("action", "getqrcode")
            .query_opt("skipped", None)
            .query("random", 12345);
        let outbound = client.build_outbound(&request).unwrap();

        assert_eq!(
            outbound.url.as_str(),
            "https://mp.weixin.qq.com/cgi-bin/scanloginqrcode?action=getqrcode&random=12345"
        );
    }

    #[test]
    fn test_post_form_body() {
        let client = client(Scripted::new(vec![]));
        let request = ProxyRequest::post("https://mp.weixin.qq.com/cgi-bin/bizlogin")
            .form("action", "login")
            .form("token", "a b&c");
        let outbound = client.build_outbound(&request).unwrap();

        assert_eq!(outbound.body.unwrap(), Bytes::from_static(b"action=login&token=a+b%26c"));
        assert_eq!(outbound.headers.get(CONTENT_TYPE).unwrap(), FORM_CONTENT_TYPE);
    }

    #[test]
    fn test_get_never_sends_body() {
        let client = client(Scripted::new(vec![]));
        let request = ProxyRequest::get("http://upstream.test/").form("ignored", 1);
        assert!(client.build_outbound(&request).unwrap().body.is_none());
    }

    #[test]
    fn test_header_precedence() {
        let client = client(Scripted::new(vec![]));
        let request = ProxyRequest::get("http://upstream.test/")
            .cookies(CookieJar::parse("uuid=abc"))
            .header("Referer", "https://caller.example/");
        let outbound = client.build_outbound(&request).unwrap();

        assert_eq!(outbound.headers.get(REFERER).unwrap(), "https://caller.example/");
        assert_eq!(outbound.headers.get(COOKIE).unwrap(), "uuid=abc");
        assert!(outbound.headers.get(USER_AGENT).is_some());
    }

    #[test]
    fn test_credentials_can_be_withheld() {
        let client = client(Scripted::new(vec![]));
        let request = ProxyRequest::get("http://upstream.test/")
            .cookies(CookieJar::parse("uuid=abc"))
            .with_credentials(false);
        let outbound = client.build_outbound(&request).unwrap();
        assert!(outbound.headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_invalid_endpoint() {
        let client = client(Scripted::new(vec![]));
        let err = client.build_outbound(&ProxyRequest::get("not a url")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }
}
