use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{CreateStaffRequest, ProviderError, StaffMember, StaffMetrics, UpdateStaffRequest};
use crate::services::provider::{parse_single, representation_headers};

pub struct StaffService {
    store: Arc<StoreClient>,
}

impl StaffService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn create_staff(
        &self,
        provider_id: Uuid,
        request: CreateStaffRequest,
        auth_token: &str,
    ) -> Result<StaffMember, ProviderError> {
        if request.name.trim().is_empty() {
            return Err(ProviderError::InvalidInput("Staff name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let staff_data = json!({
            "provider_id": provider_id,
            "name": request.name,
            "specialties": request.specialties.unwrap_or_default(),
            "active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/staff_members",
                Some(auth_token),
                Some(staff_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let staff: StaffMember = parse_single(result)?;
        info!("Staff member {} created for provider {}", staff.id, provider_id);
        Ok(staff)
    }

    pub async fn update_staff(
        &self,
        provider_id: Uuid,
        staff_id: Uuid,
        request: UpdateStaffRequest,
        auth_token: &str,
    ) -> Result<StaffMember, ProviderError> {
        let mut update_data = serde_json::Map::new();

        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(ProviderError::InvalidInput("Staff name cannot be empty".to_string()));
            }
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(specialties) = request.specialties {
            update_data.insert("specialties".to_string(), json!(specialties));
        }
        if let Some(active) = request.active {
            update_data.insert("active".to_string(), json!(active));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!(
            "/rest/v1/staff_members?id=eq.{}&provider_id=eq.{}",
            staff_id, provider_id
        );
        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::StaffNotFound);
        }
        parse_single(result)
    }

    pub async fn list_staff(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<StaffMember>, ProviderError> {
        let path = format!(
            "/rest/v1/staff_members?provider_id=eq.{}&order=name.asc",
            provider_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<StaffMember>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse staff: {}", e)))
    }

    /// Active roster in stable name order; assignment strategies depend on
    /// this ordering being deterministic.
    pub async fn get_active_staff(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<StaffMember>, ProviderError> {
        let path = format!(
            "/rest/v1/staff_members?provider_id=eq.{}&active=eq.true&order=name.asc,id.asc",
            provider_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<StaffMember>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse staff: {}", e)))
    }

    /// Per-period figures computed from the appointment set on every call.
    pub async fn staff_metrics(
        &self,
        provider_id: Uuid,
        staff_id: Uuid,
        from_date: DateTime<Utc>,
        to_date: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<StaffMetrics, ProviderError> {
        debug!("Calculating metrics for staff {} between {} and {}", staff_id, from_date, to_date);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&staff_id=eq.{}&scheduled_start_time=gte.{}&scheduled_start_time=lte.{}",
            provider_id,
            staff_id,
            urlencoding::encode(&from_date.to_rfc3339()),
            urlencoding::encode(&to_date.to_rfc3339()),
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let mut appointment_count = 0;
        let mut completed_count = 0;
        let mut revenue = Decimal::ZERO;

        for row in &result {
            let status = row["status"].as_str().unwrap_or_default();
            if matches!(status, "cancelled") {
                continue;
            }
            appointment_count += 1;
            if status == "completed" {
                completed_count += 1;
                if let Some(price) = row["price"].as_str() {
                    if let Ok(amount) = price.parse::<Decimal>() {
                        revenue += amount;
                    }
                } else if let Some(price) = row["price"].as_f64() {
                    if let Ok(amount) = Decimal::try_from(price) {
                        revenue += amount;
                    }
                }
            }
        }

        Ok(StaffMetrics {
            staff_id,
            from_date,
            to_date,
            appointment_count,
            completed_count,
            revenue,
        })
    }
}
