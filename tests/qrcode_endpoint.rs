//! End-to-end tests for the QR-code endpoint against a mock upstream.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

mod common;

use common::Reply;

#[tokio::test]
async fn test_relays_image_with_cors_headers() {
    let (upstream, recorded) = common::start_programmable_upstream(|| async {
        Reply::new(200, Some("image/png"), b"\x89PNG\r\n\x1a\n")
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(upstream)).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .header("Cookie", "slave_sid=abc; uuid=u-1")
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 200);
    let headers = res.headers().clone();
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type, Authorization");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(&res.bytes().await.unwrap()[..], b"\x89PNG\r\n\x1a\n");

    assert_eq!(recorded.count(), 1);
    let head = recorded.get(0);
    assert!(head.starts_with("get /cgi-bin/scanloginqrcode?action=getqrcode&random="));
    assert!(head.contains("cookie: slave_sid=abc;uuid=u-1"));
    assert!(head.contains("referer: https://mp.weixin.qq.com/"));
    assert!(head.contains("origin: https://mp.weixin.qq.com"));
    assert!(head.contains("sec-fetch-dest: image"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let (upstream, recorded) = common::start_programmable_upstream(move || {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                Reply::new(503, None, b"busy")
            } else {
                Reply::new(200, Some("image/jpeg"), b"jpeg-bytes")
            }
        }
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(upstream)).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200, "Should eventually succeed after retries");
    assert_eq!(&res.bytes().await.unwrap()[..], b"jpeg-bytes");
    assert_eq!(recorded.count(), 3);

    shutdown.trigger();
}

#[tokio::test]
async fn test_persistent_server_error_becomes_500() {
    let (upstream, recorded) =
        common::start_programmable_upstream(|| async { Reply::new(503, None, b"down") }).await;
    let mut config = common::config_for(upstream);
    config.upstream.max_attempts = 2;
    let (proxy, shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        res.text().await.unwrap(),
        "Failed to fetch QR code: WeChat API returned 503"
    );
    assert_eq!(recorded.count(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (upstream, recorded) =
        common::start_programmable_upstream(|| async { Reply::new(404, None, b"gone") }).await;
    let (proxy, shutdown) = common::start_proxy(common::config_for(upstream)).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    assert_eq!(recorded.count(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_empty_payload_redirects_to_fallback() {
    let (upstream, _) =
        common::start_programmable_upstream(|| async { Reply::new(200, Some("image/jpeg"), b"") }).await;
    let config = common::config_for(upstream);
    let fallback = config.upstream.fallback_qrcode_url.clone();
    let (proxy, shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()["location"], fallback.as_str());
    assert_eq!(res.headers()["content-type"], "image/png");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_upstream_exhausts_retries() {
    // Reserve a port, then free it so connections are refused.
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = reserved.local_addr().unwrap();
    drop(reserved);

    let mut config = common::config_for(dead);
    config.upstream.max_attempts = 2;
    let (proxy, shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("Failed to fetch QR code: all 2 attempts failed: network error"), "{body}");

    shutdown.trigger();
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let (upstream, recorded) = common::start_programmable_upstream(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Reply::new(200, Some("image/jpeg"), b"late")
    })
    .await;
    let mut config = common::config_for(upstream);
    config.upstream.timeout_ms = 100;
    config.upstream.max_attempts = 2;
    let (proxy, shutdown) = common::start_proxy(config).await;

    let res = common::client()
        .get(format!("http://{}/api/login/getqrcode", proxy))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    assert_eq!(
        res.text().await.unwrap(),
        "Failed to fetch QR code: all 2 attempts failed: request timed out after 100ms"
    );
    assert_eq!(recorded.count(), 2);

    shutdown.trigger();
}
