use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{CustomerError, CustomerPreference};

const MAX_KEY_LENGTH: usize = 64;

/// Per-user key/value preference records. Scoped to the authenticated user;
/// nothing here is readable across accounts.
pub struct PreferenceService {
    store: Arc<StoreClient>,
}

impl PreferenceService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub async fn list_preferences(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<CustomerPreference>, CustomerError> {
        debug!("Listing preferences for user {}", user_id);

        let path = format!(
            "/rest/v1/customer_preferences?user_id=eq.{}&order=key.asc",
            user_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<CustomerPreference>, _>>()
            .map_err(|e| CustomerError::DatabaseError(format!("Failed to parse preferences: {}", e)))
    }

    pub async fn get_preference(
        &self,
        user_id: Uuid,
        key: &str,
        auth_token: &str,
    ) -> Result<CustomerPreference, CustomerError> {
        let path = format!(
            "/rest/v1/customer_preferences?user_id=eq.{}&key=eq.{}",
            user_id,
            urlencoding::encode(key)
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(CustomerError::PreferenceNotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| CustomerError::DatabaseError(format!("Failed to parse preference: {}", e)))
    }

    /// Write one preference; last write wins.
    pub async fn set_preference(
        &self,
        user_id: Uuid,
        key: &str,
        value: Value,
        auth_token: &str,
    ) -> Result<CustomerPreference, CustomerError> {
        validate_key(key)?;

        // Replace-on-write keeps one row per (user, key).
        let delete_path = format!(
            "/rest/v1/customer_preferences?user_id=eq.{}&key=eq.{}",
            user_id,
            urlencoding::encode(key)
        );
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &delete_path, Some(auth_token), None)
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let preference_data = json!({
            "user_id": user_id,
            "key": key,
            "value": value,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/customer_preferences",
                Some(auth_token),
                Some(preference_data),
                Some(headers),
            )
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(CustomerError::DatabaseError("Failed to save preference".to_string()));
        }

        let preference: CustomerPreference = serde_json::from_value(result[0].clone())
            .map_err(|e| CustomerError::DatabaseError(format!("Failed to parse preference: {}", e)))?;

        info!("Preference {} saved for user {}", key, user_id);
        Ok(preference)
    }

    pub async fn delete_preference(
        &self,
        user_id: Uuid,
        key: &str,
        auth_token: &str,
    ) -> Result<(), CustomerError> {
        let path = format!(
            "/rest/v1/customer_preferences?user_id=eq.{}&key=eq.{}",
            user_id,
            urlencoding::encode(key)
        );
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), CustomerError> {
    if key.trim().is_empty() {
        return Err(CustomerError::InvalidInput("Preference key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CustomerError::InvalidInput(format!(
            "Preference key cannot exceed {} characters",
            MAX_KEY_LENGTH
        )));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(CustomerError::InvalidInput(
            "Preference key may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_keys() {
        assert!(validate_key("onboarding_progress").is_ok());
        assert!(validate_key("welcome-banner.dismissed").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("  ").is_err());
        assert!(validate_key(&"k".repeat(65)).is_err());
    }

    #[test]
    fn rejects_unexpected_characters() {
        assert!(validate_key("has space").is_err());
        assert!(validate_key("semi;colon").is_err());
    }
}
