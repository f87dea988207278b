use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub store_url: String,
    pub store_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            store_url: "http://localhost:54321".to_string(),
            store_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            store_url: self.store_url.clone(),
            store_anon_key: self.store_anon_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            payment_api_url: "http://localhost:54322".to_string(),
            payment_api_key: "test-payment-key".to_string(),
            email_api_url: "http://localhost:54323".to_string(),
            email_api_key: "test-email-key".to_string(),
            email_sender: "bookings@test.velora.app".to_string(),
            sms_api_url: "http://localhost:54324".to_string(),
            sms_api_key: "test-sms-key".to_string(),
            sms_sender: "Velora".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "customer".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn customer(email: &str) -> Self {
        Self::new(email, "customer")
    }

    pub fn provider(email: &str) -> Self {
        Self::new(email, "provider")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockStoreResponses;

impl MockStoreResponses {
    pub fn provider_response(provider_id: &str, owner_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": provider_id,
            "owner_id": owner_id,
            "name": name,
            "timezone": "UTC",
            "buffer_minutes": 15,
            "min_notice_minutes": 120,
            "max_advance_days": 90,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn working_hours_response(provider_id: &str, weekday: i32, open: &str, close: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "weekday": weekday,
            "open_time": open,
            "close_time": close,
            "is_closed": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn service_response(service_id: &str, provider_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": service_id,
            "provider_id": provider_id,
            "name": name,
            "category": "hair",
            "duration_minutes": 60,
            "price": "45.00",
            "active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn staff_response(staff_id: &str, provider_id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": staff_id,
            "provider_id": provider_id,
            "name": name,
            "specialties": ["hair"],
            "active": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        provider_id: &str,
        service_id: &str,
        customer_id: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "provider_id": provider_id,
            "service_id": service_id,
            "customer_id": customer_id,
            "staff_id": null,
            "scheduled_start_time": start,
            "scheduled_end_time": end,
            "duration_minutes": 60,
            "price": "45.00",
            "status": status,
            "payment_status": "authorized",
            "payment_ref": "pay_test_123",
            "idempotency_key": Uuid::new_v4().to_string(),
            "cancellation_reason": null,
            "cancelled_by": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn cancellation_policy_response(provider_id: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "tiers": [
                {"hours_before": 24, "refund_percentage": 100},
                {"hours_before": 2, "refund_percentage": 50},
                {"hours_before": 0, "refund_percentage": 0}
            ],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message,
                "code": code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.store_url, "http://localhost:54321");
        assert_eq!(app_config.store_anon_key, "test-anon-key");
        assert!(!app_config.jwt_secret.is_empty());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::provider("salon@example.com");
        assert_eq!(user.email, "salon@example.com");
        assert_eq!(user.role, "provider");

        let user_model = user.to_user();
        assert_eq!(user_model.email, Some(user.email.clone()));
        assert_eq!(user_model.role, Some(user.role.clone()));
        assert_eq!(user_model.id, user.id);
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let secret = "test-secret";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        assert!(token.contains('.'));
        assert_eq!(token.split('.').count(), 3);
    }
}
