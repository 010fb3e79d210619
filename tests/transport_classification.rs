//! HTTP responses from a mock upstream, classified and retried by the governor.

use ai_gate_rust::error_code::StandardErrorCode;
use ai_gate_rust::transport::{build_client, check_response};
use ai_gate_rust::{ConcurrencyGovernor, ServiceLimits};
use mockito::Server;
use std::time::Duration;

async fn get(url: &str) -> ai_gate_rust::Result<reqwest::Response> {
    let client = build_client()?;
    let resp = client.get(url).send().await?;
    check_response(resp).await
}

#[tokio::test]
async fn success_passes_through() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/ok")
        .with_status(200)
        .with_body("fine")
        .create_async()
        .await;

    let resp = get(&format!("{}/v1/ok", server.url())).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "fine");
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limited_is_transient_with_retry_after() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v1/chat")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body(r#"{"error":{"code":"rate_limit_exceeded","message":"slow down"}}"#)
        .create_async()
        .await;

    let err = get(&format!("{}/v1/chat", server.url())).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.code(), StandardErrorCode::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn auth_failure_is_permanent() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v1/chat")
        .with_status(401)
        .with_body(r#"{"error":{"code":"invalid_api_key"}}"#)
        .create_async()
        .await;

    let err = get(&format!("{}/v1/chat", server.url())).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.code(), StandardErrorCode::Authentication);
}

#[tokio::test]
async fn provider_code_overrides_status() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/v1/chat")
        .with_status(429)
        .with_body(r#"{"error":{"code":"insufficient_quota"}}"#)
        .create_async()
        .await;

    let err = get(&format!("{}/v1/chat", server.url())).await.unwrap_err();
    assert_eq!(err.code(), StandardErrorCode::QuotaExhausted);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn overloaded_upstream_is_retried_by_governor() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("GET", "/hooks/run")
        .with_status(503)
        .with_body("busy")
        .expect(2)
        .create_async()
        .await;
    let url = format!("{}/hooks/run", server.url());

    let governor = ConcurrencyGovernor::new(
        ServiceLimits::default()
            .with_retry_attempts(1)
            .with_backoff(Duration::from_millis(5), Duration::from_millis(10)),
    );
    let err = governor
        .execute("zapier", || get(&url))
        .await
        .unwrap_err();

    assert_eq!(err.code(), StandardErrorCode::Overloaded);
    failing.assert_async().await;
    assert_eq!(governor.stats("zapier").retry_count, 1);
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    // nothing listens on the discard port
    let err = get("http://127.0.0.1:9/").await.unwrap_err();
    assert_eq!(err.code(), StandardErrorCode::Network);
    assert!(err.is_retryable());
}
