use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::models::NotificationEvent;
use notification_cell::services::DispatchService;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

fn test_app_config(mock_server: &MockServer) -> AppConfig {
    let base = TestConfig::default();
    AppConfig {
        store_url: mock_server.uri(),
        email_api_url: mock_server.uri(),
        sms_api_url: mock_server.uri(),
        ..base.to_app_config()
    }
}

fn booking_created_event() -> NotificationEvent {
    NotificationEvent::BookingCreated {
        appointment_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        provider_name: "Glow Studio".to_string(),
        service_name: "Balayage".to_string(),
        start_time: "2025-06-02T10:00:00Z".parse().unwrap(),
    }
}

fn outbox_row(channel: &str, recipient: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "appointment_id": Uuid::new_v4(),
        "event_type": "booking_created",
        "channel": channel,
        "recipient": recipient,
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

#[tokio::test]
async fn test_dispatch_records_and_sends_per_channel() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/customer_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "email": "customer@example.com",
            "phone": "+33612345678",
            "locale": "en"
        }])))
        .mount(&mock_server)
        .await;

    // Both channels have a destination: two outbox rows, two transmissions.
    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([outbox_row("email", "customer@example.com")])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([outbox_row("sms", "+33612345678")])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"delivery_id": "msg_1"})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dispatch = DispatchService::new(&test_app_config(&mock_server));
    let result = dispatch.dispatch(booking_created_event(), "token").await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_dispatch_fails_without_contact_details() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/customer_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "email": null,
            "phone": null,
            "locale": "en"
        }])))
        .mount(&mock_server)
        .await;

    let dispatch = DispatchService::new(&test_app_config(&mock_server));
    let result = dispatch.dispatch(booking_created_event(), "token").await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_failed_transmission_is_recorded_not_raised() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/customer_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "email": "customer@example.com",
            "phone": null,
            "locale": "en"
        }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([outbox_row("email", "customer@example.com")])))
        .mount(&mock_server)
        .await;

    // Collaborator rejects the message; the outbox row absorbs the failure.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({"error": "down"})))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/notification_outbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .named("failure bookkeeping")
        .mount(&mock_server)
        .await;

    let dispatch = DispatchService::new(&test_app_config(&mock_server));
    let result = dispatch.dispatch(booking_created_event(), "token").await;

    // Dispatch is fire-and-forget: the failed delivery is queued for the
    // sweep, not surfaced to the booking flow.
    assert!(result.is_ok());
}
