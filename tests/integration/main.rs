//! Integration tests using WireMock
//!
//! These tests drive the executor through the real reqwest transport against
//! a mock HTTP server: retries, circuit breaking, correlation ids,
//! authentication and cancellation over actual connections.

mod auth;
mod executor;
mod resilience;

use recommendation_client::{CircuitBreakerConfig, ClientConfigBuilder, RecommendationClient};
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

/// Helper to create a mock server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Base configuration pointing at the mock server with fast, deterministic retries.
pub fn test_config(server: &MockServer) -> ClientConfigBuilder {
    config_for(server.uri())
}

/// Same settings as [`test_config`] against an arbitrary base URL.
pub fn config_for(base_url: impl Into<String>) -> ClientConfigBuilder {
    ClientConfigBuilder::new()
        .base_url(base_url)
        .timeout(Duration::from_secs(5))
        .retry_delay(Duration::from_millis(10))
        .jitter(false)
        .circuit_breaker(CircuitBreakerConfig::disabled())
}

/// Builds a client from a configuration builder.
pub fn client(config: ClientConfigBuilder) -> RecommendationClient {
    RecommendationClient::new(config.build().expect("valid config")).expect("client builds")
}

/// Helper to create error response templates in the API's error shape
pub fn error_response(status: u16, detail: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(serde_json::json!({ "detail": detail }))
}

/// Helper to create success response templates
pub fn success_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Correlation ids of every request the server received, in order.
pub async fn received_request_ids(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| {
            request
                .headers
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}
