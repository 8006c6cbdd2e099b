//! Integration tests for circuit breaking over real connections

use super::*;
use recommendation_client::{CircuitState, ErrorKind, RequestOptions};
use wiremock::matchers::{method, path};
use wiremock::Mock;

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_recovers() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/popular"))
        .respond_with(error_response(502, "upstream down"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/popular"))
        .respond_with(success_response(serde_json::json!({"items": ["sku-5"]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(
        test_config(&server).retries(0).circuit_breaker(
            CircuitBreakerConfig::new()
                .failure_threshold(3)
                .reset_timeout(Duration::from_millis(200)),
        ),
    );

    for _ in 0..3 {
        let error = client.get("popular", RequestOptions::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Server);
    }
    assert_eq!(client.circuit_breaker().state(), CircuitState::Open);

    let error = client.get("popular", RequestOptions::new()).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::CircuitOpen);
    assert_eq!(received_request_ids(&server).await.len(), 3);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let response = client.get("popular", RequestOptions::new()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
    assert_eq!(client.metrics().errors_of(ErrorKind::CircuitOpen), 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = client(config_for(format!("http://{}", address)).retries(1));
    let error = client.get("anything", RequestOptions::new()).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Network);
    assert!(error.request_id().is_some());
    assert_eq!(client.metrics().attempts, 2);
}
