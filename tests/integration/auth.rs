//! Integration tests for admin authentication

use super::*;
use recommendation_client::{ApiError, RequestOptions};
use wiremock::matchers::{header, method, path};
use wiremock::Mock;

#[tokio::test]
async fn test_bearer_key_sent_on_admin_requests() {
    let server = setup_mock_server().await;

    Mock::given(method("DELETE"))
        .and(path("/admin/models/7"))
        .and(header("authorization", "Bearer sk_admin_test"))
        .respond_with(wiremock::ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server).api_key("sk_admin_test"));
    let response = client
        .delete("admin/models/7", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn test_auth_error_is_never_retried() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/admin/stats"))
        .respond_with(error_response(403, "admin scope required"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(test_config(&server).retries(5).api_key("sk_readonly"));
    let error = client
        .get("admin/stats", RequestOptions::new())
        .await
        .unwrap_err();

    match error {
        ApiError::Auth {
            status_code,
            message,
            ..
        } => {
            assert_eq!(status_code, 403);
            assert_eq!(message, "admin scope required");
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}
