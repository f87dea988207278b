use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Datelike, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::router::booking_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn test_app_config(mock_server: &MockServer) -> AppConfig {
    let base = TestConfig::default();
    AppConfig {
        store_url: mock_server.uri(),
        store_anon_key: base.store_anon_key.clone(),
        jwt_secret: base.jwt_secret.clone(),
        payment_api_url: mock_server.uri(),
        payment_api_key: "test-payment-key".to_string(),
        email_api_url: mock_server.uri(),
        email_api_key: "test-email-key".to_string(),
        email_sender: "bookings@test.velora.app".to_string(),
        sms_api_url: mock_server.uri(),
        sms_api_key: "test-sms-key".to_string(),
        sms_sender: "Velora".to_string(),
    }
}

fn create_test_app(config: AppConfig) -> Router {
    booking_routes(Arc::new(config))
}

struct BookingFixture {
    provider_id: Uuid,
    service_id: Uuid,
    customer: TestUser,
    date: chrono::NaiveDate,
}

impl BookingFixture {
    fn new() -> Self {
        Self {
            provider_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            customer: TestUser::customer("customer@example.com"),
            // A week out keeps us clear of the notice cutoff and inside the
            // advance horizon regardless of when the test runs.
            date: (Utc::now() + Duration::days(7)).date_naive(),
        }
    }

    fn provider_row(&self) -> Value {
        json!({
            "id": self.provider_id,
            "owner_id": Uuid::new_v4().to_string(),
            "name": "Glow Studio",
            "timezone": "UTC",
            "buffer_minutes": 15,
            "min_notice_minutes": 120,
            "max_advance_days": 90,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn service_row(&self) -> Value {
        json!({
            "id": self.service_id,
            "provider_id": self.provider_id,
            "name": "Balayage",
            "category": "hair",
            "duration_minutes": 60,
            "price": "45.00",
            "active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn working_hours_row(&self) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": self.provider_id,
            "weekday": self.date.weekday().num_days_from_sunday(),
            "open_time": "09:00:00",
            "close_time": "18:00:00",
            "is_closed": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn appointment_row(&self, id: Uuid, start: &str, end: &str, status: &str) -> Value {
        json!({
            "id": id,
            "provider_id": self.provider_id,
            "service_id": self.service_id,
            "customer_id": self.customer.id,
            "staff_id": null,
            "scheduled_start_time": format!("{}T{}+00:00", self.date, start),
            "scheduled_end_time": format!("{}T{}+00:00", self.date, end),
            "duration_minutes": 60,
            "price": "45.00",
            "status": status,
            "payment_status": "pending",
            "payment_ref": null,
            "idempotency_key": Uuid::new_v4().to_string(),
            "cancellation_reason": null,
            "cancelled_by": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn outbox_row(&self) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "appointment_id": Uuid::new_v4(),
            "event_type": "booking_created",
            "channel": "email",
            "recipient": "customer@example.com",
            "subject": "Booking confirmed at Glow Studio",
            "body": "text",
            "html_body": "<p>text</p>",
            "status": "pending",
            "attempts": 0,
            "max_attempts": 5,
            "scheduled_for": "2024-01-01T00:00:00Z",
            "last_error": null,
            "delivery_id": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn auth_header(&self) -> String {
        let token = JwtTestUtils::create_test_token(
            &self.customer,
            &TestConfig::default().jwt_secret,
            Some(24),
        );
        format!("Bearer {}", token)
    }

    fn book_request_body(&self) -> Value {
        json!({
            "provider_id": self.provider_id,
            "service_id": self.service_id,
            "customer_id": self.customer.id,
            "date": self.date,
            "start_time": "11:30:00",
            "idempotency_key": Uuid::new_v4().to_string()
        })
    }
}

/// Store-side mocks shared by every booking flow. Lock and payment endpoints
/// are mounted separately so individual tests control their behavior.
async fn mount_store_mocks(mock_server: &MockServer, fixture: &BookingFixture, existing: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/providers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.provider_row()])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/service_offerings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.service_row()])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/working_hours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([fixture.working_hours_row()])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/blocked_dates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    // Conflict/read queries see the existing set; the idempotency dedup
    // lookup (the only appointments query carrying an idempotency_key
    // filter) finds nothing, so each test booking is a fresh attempt.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_is_missing("idempotency_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(existing)))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    let created = fixture.appointment_row(Uuid::new_v4(), "11:30:00", "12:30:00", "scheduled");
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .mount(mock_server)
        .await;

    let patched = fixture.appointment_row(Uuid::new_v4(), "11:30:00", "12:30:00", "scheduled");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([patched])))
        .mount(mock_server)
        .await;

    // Notification side: contact lookup, outbox bookkeeping, transmission.
    Mock::given(method("GET"))
        .and(path("/rest/v1/customer_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "email": "customer@example.com",
            "phone": null,
            "locale": "en"
        }])))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([fixture.outbox_row()])))
        .mount(mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"delivery_id": "msg_1"})))
        .mount(mock_server)
        .await;
}

async fn mount_lock_success(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"lock_key": "k"}])))
        .mount(mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn mount_payment_success(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/authorizations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authorization_id": "auth_123"})))
        .mount(mock_server)
        .await;
}

async fn send_booking(app: Router, fixture: &BookingFixture, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Authorization", fixture.auth_header())
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));
    (status, value)
}

#[tokio::test]
async fn test_book_appointment_success() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();
    mount_store_mocks(&mock_server, &fixture, vec![]).await;
    mount_lock_success(&mock_server).await;
    mount_payment_success(&mock_server).await;

    let app = create_test_app(test_app_config(&mock_server));
    let (status, body) = send_booking(app, &fixture, fixture.book_request_body()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["appointment"]["status"], json!("scheduled"));
}

#[tokio::test]
async fn test_booking_rejects_missing_token() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("Content-Type", "application/json")
                .body(Body::from(fixture.book_request_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_rejects_other_customers() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();

    let mut body = fixture.book_request_body();
    body["customer_id"] = json!(Uuid::new_v4().to_string());

    let app = create_test_app(test_app_config(&mock_server));
    let (status, _) = send_booking(app, &fixture, body).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_booking_conflict_detected_under_lock() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();

    // Existing confirmed 11:00-12:00; with the 15-minute buffer the 11:30
    // request overlaps and must be rejected as retryable.
    let existing = fixture.appointment_row(Uuid::new_v4(), "11:00:00", "12:00:00", "confirmed");
    mount_store_mocks(&mock_server, &fixture, vec![existing]).await;
    mount_lock_success(&mock_server).await;
    mount_payment_success(&mock_server).await;

    let app = create_test_app(test_app_config(&mock_server));
    let (status, body) = send_booking(app, &fixture, fixture.book_request_body()).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("SLOT_CONFLICT"));
    assert_eq!(body["retryable"], json!(true));
}

#[tokio::test]
async fn test_concurrent_conflicting_bookings_exactly_one_wins() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();
    mount_store_mocks(&mock_server, &fixture, vec![]).await;
    mount_payment_success(&mock_server).await;

    // The lock insert is the atomic claim: the first attempt gets 201, every
    // later one hits the unique constraint.
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"lock_key": "k"}])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "duplicate key"})))
        .mount(&mock_server)
        .await;
    // The loser probes the holder, finds it fresh, and gives up.
    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lock_key": "k",
            "expires_at": (Utc::now() + Duration::seconds(30)).to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = test_app_config(&mock_server);
    let app_a = create_test_app(config.clone());
    let app_b = create_test_app(config);

    let (result_a, result_b) = tokio::join!(
        send_booking(app_a, &fixture, fixture.book_request_body()),
        send_booking(app_b, &fixture, fixture.book_request_body()),
    );

    let statuses = [result_a.0, result_b.0];
    let winners = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let losers = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();

    assert_eq!(winners, 1, "exactly one racing booking must succeed: {:?}", statuses);
    assert_eq!(losers, 1, "the other racing booking must lose with a conflict: {:?}", statuses);
}

#[tokio::test]
async fn test_payment_failure_rolls_back_booking() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();
    mount_store_mocks(&mock_server, &fixture, vec![]).await;
    mount_lock_success(&mock_server).await;

    // Payment collaborator down.
    Mock::given(method("POST"))
        .and(path("/v1/authorizations"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "down"})))
        .mount(&mock_server)
        .await;

    // The tentative appointment must be deleted; .expect(1) verifies on drop.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .named("tentative appointment rollback")
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let (status, body) = send_booking(app, &fixture, fixture.book_request_body()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], json!("DEPENDENCY_UNAVAILABLE"));
}

#[tokio::test]
async fn test_cancel_completed_appointment_rejected() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();

    let appointment_id = Uuid::new_v4();
    let completed = fixture.appointment_row(appointment_id, "10:00:00", "11:00:00", "completed");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([completed])))
        .mount(&mock_server)
        .await;

    // Terminal-state guard: no write and no refund instruction may happen.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/refunds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refund_id": "r"})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/{}/cancel", appointment_id))
                .header("Authorization", fixture.auth_header())
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"reason": "changed plans", "cancelled_by": "customer"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], json!("INVALID_STATE_TRANSITION"));
}

#[tokio::test]
async fn test_generate_slots_respects_boundary_and_conflicts() {
    let mock_server = MockServer::start().await;
    let fixture = BookingFixture::new();

    let existing = fixture.appointment_row(Uuid::new_v4(), "10:00:00", "11:00:00", "confirmed");
    mount_store_mocks(&mock_server, &fixture, vec![existing]).await;

    let app = create_test_app(test_app_config(&mock_server));
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/providers/{}/slots?date={}&service_id={}",
                    fixture.provider_id, fixture.date, fixture.service_id
                ))
                .header("Authorization", fixture.auth_header())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let slots = body["slots"].as_array().unwrap();

    // 09:00-18:00 at a 30-minute step with a 60-minute service: candidates
    // run 09:00 through 17:00 (17:30 would finish past closing).
    assert_eq!(slots.len(), 17);
    assert_eq!(slots.first().unwrap()["time"], json!("09:00:00"));
    assert_eq!(slots.last().unwrap()["time"], json!("17:00:00"));

    // The confirmed 10:00-11:00, buffer-extended to [09:45, 11:15), blocks
    // every 60-minute candidate from 09:00 through 11:00; 11:30 is free.
    let availability: std::collections::HashMap<String, bool> = slots
        .iter()
        .map(|s| {
            (
                s["time"].as_str().unwrap().to_string(),
                s["available"].as_bool().unwrap(),
            )
        })
        .collect();
    assert_eq!(availability["09:00:00"], false);
    assert_eq!(availability["10:30:00"], false);
    assert_eq!(availability["11:00:00"], false);
    assert_eq!(availability["11:30:00"], true);
    assert_eq!(availability["17:00:00"], true);
}
