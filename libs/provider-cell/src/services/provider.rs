use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{
    BlockedDate, CreateBlockedDateRequest, CreateProviderRequest, Provider, ProviderError,
    UpdateConstraintsRequest, UpsertWorkingHoursRequest, WorkingHours,
};

pub struct ProviderService {
    store: Arc<StoreClient>,
}

impl ProviderService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// Register a new provider owned by the authenticated account.
    pub async fn create_provider(
        &self,
        owner_id: &str,
        request: CreateProviderRequest,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        if request.name.trim().is_empty() {
            return Err(ProviderError::InvalidInput("Provider name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let provider_data = json!({
            "owner_id": owner_id,
            "name": request.name,
            "timezone": request.timezone.unwrap_or_else(|| "UTC".to_string()),
            "buffer_minutes": request.buffer_minutes.unwrap_or(0),
            "min_notice_minutes": request.min_notice_minutes.unwrap_or(0),
            "max_advance_days": request.max_advance_days.unwrap_or(90),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/providers",
                Some(auth_token),
                Some(provider_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let provider: Provider = parse_single(result)?;
        info!("Provider {} created for owner {}", provider.id, owner_id);
        Ok(provider)
    }

    pub async fn get_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        debug!("Fetching provider: {}", provider_id);

        let path = format!("/rest/v1/providers?id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse provider: {}", e)))
    }

    /// Update buffer/notice/advance constraints. New values apply to future
    /// bookings only; existing appointments keep their committed windows.
    pub async fn update_constraints(
        &self,
        provider_id: Uuid,
        request: UpdateConstraintsRequest,
        auth_token: &str,
    ) -> Result<Provider, ProviderError> {
        let mut update_data = serde_json::Map::new();

        if let Some(buffer) = request.buffer_minutes {
            if buffer < 0 {
                return Err(ProviderError::InvalidInput("Buffer minutes cannot be negative".to_string()));
            }
            update_data.insert("buffer_minutes".to_string(), json!(buffer));
        }
        if let Some(notice) = request.min_notice_minutes {
            if notice < 0 {
                return Err(ProviderError::InvalidInput("Minimum notice cannot be negative".to_string()));
            }
            update_data.insert("min_notice_minutes".to_string(), json!(notice));
        }
        if let Some(advance) = request.max_advance_days {
            if advance <= 0 {
                return Err(ProviderError::InvalidInput("Maximum advance days must be positive".to_string()));
            }
            update_data.insert("max_advance_days".to_string(), json!(advance));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/providers?id=eq.{}", provider_id);
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

        parse_single(result)
    }

    // ==============================================================================
    // WORKING HOURS
    // ==============================================================================

    /// Create or replace the weekly rule for one weekday.
    pub async fn upsert_working_hours(
        &self,
        provider_id: Uuid,
        request: UpsertWorkingHoursRequest,
        auth_token: &str,
    ) -> Result<WorkingHours, ProviderError> {
        if request.weekday < 0 || request.weekday > 6 {
            return Err(ProviderError::InvalidInput(
                "Weekday must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if request.open_time >= request.close_time {
            return Err(ProviderError::InvalidInput("Open time must be before close time".to_string()));
        }

        // One rule per weekday: delete any previous row first.
        let existing_path = format!(
            "/rest/v1/working_hours?provider_id=eq.{}&weekday=eq.{}",
            provider_id, request.weekday
        );
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let hours_data = json!({
            "provider_id": provider_id,
            "weekday": request.weekday,
            "open_time": request.open_time.format("%H:%M:%S").to_string(),
            "close_time": request.close_time.format("%H:%M:%S").to_string(),
            "is_closed": request.is_closed.unwrap_or(false),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/working_hours",
                Some(auth_token),
                Some(hours_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let hours: WorkingHours = parse_single(result)?;
        info!("Working hours set for provider {} weekday {}", provider_id, hours.weekday);
        Ok(hours)
    }

    pub async fn get_working_hours(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<WorkingHours>, ProviderError> {
        let path = format!(
            "/rest/v1/working_hours?provider_id=eq.{}&order=weekday.asc",
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
            .collect::<Result<Vec<WorkingHours>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse working hours: {}", e)))
    }

    /// The rule for a single weekday, if the provider opens that day.
    pub async fn get_working_hours_for_weekday(
        &self,
        provider_id: Uuid,
        weekday: i32,
        auth_token: &str,
    ) -> Result<Option<WorkingHours>, ProviderError> {
        let path = format!(
            "/rest/v1/working_hours?provider_id=eq.{}&weekday=eq.{}",
            provider_id, weekday
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse working hours: {}", e))),
            None => Ok(None),
        }
    }

    // ==============================================================================
    // BLOCKED DATES
    // ==============================================================================

    pub async fn create_blocked_date(
        &self,
        provider_id: Uuid,
        request: CreateBlockedDateRequest,
        auth_token: &str,
    ) -> Result<BlockedDate, ProviderError> {
        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            if start >= end {
                return Err(ProviderError::InvalidInput(
                    "Blocked window start must be before end".to_string(),
                ));
            }
        }

        let blocked_data = json!({
            "provider_id": provider_id,
            "date": request.date,
            "start_time": request.start_time.map(|t| t.format("%H:%M:%S").to_string()),
            "end_time": request.end_time.map(|t| t.format("%H:%M:%S").to_string()),
            "reason": request.reason,
            "created_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/blocked_dates",
                Some(auth_token),
                Some(blocked_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let blocked: BlockedDate = parse_single(result)?;
        info!("Blocked date {} created for provider {}", blocked.date, provider_id);
        Ok(blocked)
    }

    pub async fn delete_blocked_date(
        &self,
        provider_id: Uuid,
        blocked_date_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ProviderError> {
        let path = format!(
            "/rest/v1/blocked_dates?id=eq.{}&provider_id=eq.{}",
            blocked_date_id, provider_id
        );
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub async fn get_blocked_dates_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BlockedDate>, ProviderError> {
        let path = format!(
            "/rest/v1/blocked_dates?provider_id=eq.{}&date=eq.{}",
            provider_id, date
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BlockedDate>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse blocked dates: {}", e)))
    }
}

pub(crate) fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

pub(crate) fn parse_single<T: serde::de::DeserializeOwned>(
    result: Vec<Value>,
) -> Result<T, ProviderError> {
    if result.is_empty() {
        return Err(ProviderError::DatabaseError("Write returned no representation".to_string()));
    }
    serde_json::from_value(result[0].clone())
        .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse record: {}", e)))
}
