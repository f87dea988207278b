use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{CustomerError, CustomerProfile, UpsertProfileRequest};

pub struct ProfileService {
    store: Arc<StoreClient>,
}

impl ProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub async fn get_profile(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<CustomerProfile, CustomerError> {
        debug!("Fetching profile for user {}", user_id);

        let path = format!("/rest/v1/customer_profiles?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(CustomerError::ProfileNotFound);
        };

        serde_json::from_value(row)
            .map_err(|e| CustomerError::DatabaseError(format!("Failed to parse profile: {}", e)))
    }

    /// Create or update the caller's contact profile.
    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        request: UpsertProfileRequest,
        auth_token: &str,
    ) -> Result<CustomerProfile, CustomerError> {
        if let Some(email) = request.email.as_deref() {
            if !email.contains('@') {
                return Err(CustomerError::InvalidInput("Email address is not valid".to_string()));
            }
        }

        let now = Utc::now();
        let existing = self.get_profile(user_id, auth_token).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = match existing {
            Ok(_) => {
                let mut update_data = serde_json::Map::new();
                if let Some(full_name) = request.full_name {
                    update_data.insert("full_name".to_string(), json!(full_name));
                }
                if let Some(email) = request.email {
                    update_data.insert("email".to_string(), json!(email));
                }
                if let Some(phone) = request.phone {
                    update_data.insert("phone".to_string(), json!(phone));
                }
                if let Some(locale) = request.locale {
                    update_data.insert("locale".to_string(), json!(locale));
                }
                update_data.insert("updated_at".to_string(), json!(now.to_rfc3339()));

                let path = format!("/rest/v1/customer_profiles?user_id=eq.{}", user_id);
                self.store
                    .request_with_headers(
                        Method::PATCH,
                        &path,
                        Some(auth_token),
                        Some(Value::Object(update_data)),
                        Some(headers),
                    )
                    .await
            }
            Err(CustomerError::ProfileNotFound) => {
                let profile_data = json!({
                    "user_id": user_id,
                    "full_name": request.full_name,
                    "email": request.email,
                    "phone": request.phone,
                    "locale": request.locale.unwrap_or_else(|| "en".to_string()),
                    "created_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339()
                });
                self.store
                    .request_with_headers(
                        Method::POST,
                        "/rest/v1/customer_profiles",
                        Some(auth_token),
                        Some(profile_data),
                        Some(headers),
                    )
                    .await
            }
            Err(e) => return Err(e),
        }
        .map_err(|e| CustomerError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(CustomerError::DatabaseError("Failed to save profile".to_string()));
        }

        let profile: CustomerProfile = serde_json::from_value(result[0].clone())
            .map_err(|e| CustomerError::DatabaseError(format!("Failed to parse profile: {}", e)))?;

        info!("Profile saved for user {}", user_id);
        Ok(profile)
    }
}
