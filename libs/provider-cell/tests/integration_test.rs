use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use provider_cell::router::provider_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

fn test_app_config(mock_server: &MockServer) -> AppConfig {
    let base = TestConfig::default();
    AppConfig {
        store_url: mock_server.uri(),
        ..base.to_app_config()
    }
}

fn create_test_app(config: AppConfig) -> Router {
    provider_routes(Arc::new(config))
}

fn bearer(user: &TestUser) -> String {
    let token = JwtTestUtils::create_test_token(user, &TestConfig::default().jwt_secret, Some(24));
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_get_provider_success() {
    let mock_server = MockServer::start().await;
    let owner = TestUser::provider("salon@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::provider_response(&provider_id.to_string(), &owner.id, "Glow Studio")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{}", provider_id))
                .header("Authorization", bearer(&owner))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["name"], json!("Glow Studio"));
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let mock_server = MockServer::start().await;
    let owner = TestUser::provider("salon@example.com");
    let token = JwtTestUtils::create_expired_token(&owner, &TestConfig::default().jwt_secret);

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{}", Uuid::new_v4()))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_owner_cannot_change_working_hours() {
    let mock_server = MockServer::start().await;
    let owner = TestUser::provider("salon@example.com");
    let stranger = TestUser::provider("other@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::provider_response(&provider_id.to_string(), &owner.id, "Glow Studio")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/{}/working-hours", provider_id))
                .header("Authorization", bearer(&stranger))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"weekday": 1, "open_time": "09:00:00", "close_time": "18:00:00"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_working_hours_reject_inverted_window() {
    let mock_server = MockServer::start().await;
    let owner = TestUser::provider("salon@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::provider_response(&provider_id.to_string(), &owner.id, "Glow Studio")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/{}/working-hours", provider_id))
                .header("Authorization", bearer(&owner))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"weekday": 1, "open_time": "18:00:00", "close_time": "09:00:00"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_service_rejects_non_positive_price() {
    let mock_server = MockServer::start().await;
    let owner = TestUser::provider("salon@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::provider_response(&provider_id.to_string(), &owner.id, "Glow Studio")
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/services", provider_id))
                .header("Authorization", bearer(&owner))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "Balayage",
                        "category": "hair",
                        "duration_minutes": 60,
                        "price": "0.00"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_default_cancellation_policy_when_none_stored() {
    let mock_server = MockServer::start().await;
    let customer = TestUser::customer("customer@example.com");
    let provider_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/cancellation_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/{}/cancellation-policy", provider_id))
                .header("Authorization", bearer(&customer))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let tiers = body["policy"]["tiers"].as_array().unwrap();
    assert_eq!(tiers.len(), 3);
    assert_eq!(tiers[0]["hours_before"], json!(24));
    assert_eq!(tiers[0]["refund_percentage"], json!(100));
}
