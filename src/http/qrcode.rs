//! Login QR-code endpoint.
//!
//! `GET /api/login/getqrcode` fetches the login QR image from the upstream
//! API with the browser's cookies and relays the bytes back.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::EmptyPayloadPolicy;
use crate::http::server::AppState;
use crate::observability::{format_traffic, metrics};
use crate::upstream::{CookieJar, ProxyError, ProxyRequest, ProxyResult};

/// Content type used when upstream does not send one.
pub const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Headers a desktop Chrome sends when loading an `<img>` from the same site.
const BROWSER_IMAGE_HEADERS: &[(&str, &str)] = &[
    ("Accept", "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("sec-ch-ua", "\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\""),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("Sec-Fetch-Dest", "image"),
    ("Sec-Fetch-Mode", "no-cors"),
    ("Sec-Fetch-Site", "same-origin"),
];

/// What the endpoint sends back on success.
#[derive(Debug)]
enum QrCodeReply {
    Image { content_type: String, body: Bytes },
    /// Upstream answered with zero bytes; send the browser to the static image.
    Fallback,
}

pub async fn get_qrcode(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookies = CookieJar::from_headers(&headers);

    match fetch_qrcode(&state, cookies).await {
        Ok(QrCodeReply::Image { content_type, body }) => {
            metrics::record_qrcode("image");
            tracing::info!(
                size = %format_traffic(body.len() as u64),
                content_type = %content_type,
                "Returning QR code image"
            );
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(QrCodeReply::Fallback) => {
            metrics::record_qrcode("fallback");
            let location = state.upstream.fallback_qrcode_url.as_str();
            tracing::warn!(location, "Received empty QR code payload, redirecting to static image");
            (
                StatusCode::FOUND,
                [(header::LOCATION, location), (header::CONTENT_TYPE, "image/png")],
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_qrcode("error");
            tracing::error!(error = %e, "Error fetching QR code");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to fetch QR code: {}", e),
            )
                .into_response()
        }
    }
}

async fn fetch_qrcode(state: &AppState, cookies: CookieJar) -> ProxyResult<QrCodeReply> {
    let upstream = &state.upstream;
    let random = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    let mut request = ProxyRequest::get(upstream.qrcode_endpoint.as_str())
        .query("action", "getqrcode")
        .query("random", random)
        .cookies(cookies)
        .timeout(Duration::from_millis(upstream.timeout_ms))
        .max_attempts(upstream.max_attempts);
    for (name, value) in BROWSER_IMAGE_HEADERS {
        request = request.header(*name, *value);
    }
    request = request.header("User-Agent", upstream.user_agent.as_str());

    let response = state
        .client
        .proxy(request)
        .await?
        .into_raw()
        .ok_or_else(|| ProxyError::InvalidRequest("expected a raw response".to_string()))?;

    if !response.status.is_success() {
        tracing::error!(
            status = %response.status,
            body = %response.text_lossy(),
            "WeChat API returned non-OK status"
        );
    }
    let response = response.error_for_status()?;

    tracing::debug!(size = response.body.len(), "Binary data received");
    if response.body.is_empty() {
        return match upstream.empty_payload {
            EmptyPayloadPolicy::Redirect => Ok(QrCodeReply::Fallback),
            EmptyPayloadPolicy::Fail => Err(ProxyError::EmptyPayload),
        };
    }

    let content_type = response
        .content_type()
        .unwrap_or(DEFAULT_IMAGE_TYPE)
        .to_string();
    Ok(QrCodeReply::Image {
        content_type,
        body: response.body,
    })
}
