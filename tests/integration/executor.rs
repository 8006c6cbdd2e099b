//! Integration tests for the request executor

use super::*;
use pretty_assertions::assert_eq;
use recommendation_client::{
    ApiError, CancellationToken, CircuitState, ErrorKind, HttpRequest, RequestOptions,
};
use serde_json::json;
use std::collections::HashSet;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_get_recommendations_success() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/recommendations/user-42"))
        .and(query_param("limit", "3"))
        .respond_with(success_response(json!({
            "user_id": "user-42",
            "items": [{"id": "sku-1", "score": 0.93}, {"id": "sku-7", "score": 0.81}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server));
    let response = client
        .get("recommendations/user-42?limit=3", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["items"][0]["id"], "sku-1");

    let ids = received_request_ids(&server).await;
    assert_eq!(response.request_id(), Some(ids[0].as_str()));
}

#[tokio::test]
async fn test_post_sends_json_body_and_headers() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header("content-type", "application/json"))
        .and(header("x-client", "storefront"))
        .and(body_json(json!({"user_id": "u-1", "item_id": "sku-9", "type": "click"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server).header("X-Client", "storefront"));
    let response = client
        .post(
            "/events",
            Some(&json!({"user_id": "u-1", "item_id": "sku-9", "type": "click"})),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 202);
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/trending"))
        .respond_with(error_response(503, "warming up"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trending"))
        .respond_with(success_response(json!({"items": ["sku-3"]})))
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(2));
    let response = client.get("trending", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status, 200);

    let ids = received_request_ids(&server).await;
    assert_eq!(ids.len(), 3);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
    assert_eq!(response.request_id(), Some(ids[2].as_str()));

    let metrics = client.metrics();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.retries, 2);
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/similar/sku-1"))
        .respond_with(error_response(500, "index unavailable"))
        .expect(4)
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(3));
    let error = client
        .get("similar/sku-1", RequestOptions::new())
        .await
        .unwrap_err();

    match &error {
        ApiError::Server {
            status_code,
            message,
            request_id,
            ..
        } => {
            assert_eq!(*status_code, 500);
            assert_eq!(message, "index unavailable");
            let ids = received_request_ids(&server).await;
            assert_eq!(request_id.as_deref(), ids.last().map(String::as_str));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/recommendations/unknown"))
        .respond_with(error_response(404, "user not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(3));
    let error = client
        .get("recommendations/unknown", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Client);
    assert_eq!(error.status_code(), Some(404));
}

#[tokio::test]
async fn test_slow_response_times_out_and_retries() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(success_response(json!({})).set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(success_response(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(1));
    let response = client
        .get("slow", RequestOptions::new().timeout(Duration::from_millis(100)))
        .await
        .unwrap();

    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_cancellation_stops_in_flight_request() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(success_response(json!({})).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(3));
    let signal = CancellationToken::new();
    let canceller = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let error = client
        .get("search", RequestOptions::new().signal(signal))
        .await
        .unwrap_err();

    assert!(matches!(error, ApiError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(received_request_ids(&server).await.len(), 1);
}

#[tokio::test]
async fn test_interceptor_headers_reach_server() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/home"))
        .and(header("x-experiment", "ranker-b"))
        .respond_with(success_response(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .respond_with(success_response(json!({"items": ["fallback"]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server));
    let id = client.add_request_interceptor(|request: HttpRequest| {
        Ok::<_, ApiError>(request.with_header("X-Experiment", "ranker-b"))
    });

    let first: serde_json::Value = client.get_json("home", RequestOptions::new()).await.unwrap();
    assert_eq!(first["items"], json!([]));

    assert!(client.remove_request_interceptor(id));
    let second: serde_json::Value = client.get_json("home", RequestOptions::new()).await.unwrap();
    assert_eq!(second["items"], json!(["fallback"]));
}

#[tokio::test]
async fn test_malformed_header_never_reaches_server_or_breaker() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(success_response(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(
        test_config(&server)
            .retries(2)
            .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(3)),
    );

    for _ in 0..3 {
        let error = client
            .get("x", RequestOptions::new().header("X-Bad", "a\nb"))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(client.metrics().attempts, 0);
    assert!(received_request_ids(&server).await.is_empty());
}

#[tokio::test]
async fn test_shared_signal_does_not_accumulate_links() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(success_response(json!({"items": []})))
        .mount(&server)
        .await;

    let client = client(test_config(&server));
    let page_signal = CancellationToken::new();

    for _ in 0..10 {
        client
            .get("feed", RequestOptions::new().signal(page_signal.clone()))
            .await
            .unwrap();
    }

    assert_eq!(page_signal.pending_callbacks(), 0);
}
