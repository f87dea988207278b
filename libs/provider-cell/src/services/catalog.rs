use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{CreateServiceRequest, ProviderError, ServiceOffering, UpdateServiceRequest};
use crate::services::provider::{parse_single, representation_headers};

/// Service catalog management. Duration and price edits never rewrite booked
/// appointments; those carry their own snapshot.
pub struct CatalogService {
    store: Arc<StoreClient>,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    pub async fn create_service(
        &self,
        provider_id: Uuid,
        request: CreateServiceRequest,
        auth_token: &str,
    ) -> Result<ServiceOffering, ProviderError> {
        validate_duration_and_price(request.duration_minutes, request.price)?;
        if request.name.trim().is_empty() {
            return Err(ProviderError::InvalidInput("Service name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let service_data = json!({
            "provider_id": provider_id,
            "name": request.name,
            "category": request.category,
            "duration_minutes": request.duration_minutes,
            "price": request.price,
            "active": true,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/service_offerings",
                Some(auth_token),
                Some(service_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let service: ServiceOffering = parse_single(result)?;
        info!("Service {} created for provider {}", service.id, provider_id);
        Ok(service)
    }

    pub async fn update_service(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        request: UpdateServiceRequest,
        auth_token: &str,
    ) -> Result<ServiceOffering, ProviderError> {
        let mut update_data = serde_json::Map::new();

        if let Some(name) = request.name {
            if name.trim().is_empty() {
                return Err(ProviderError::InvalidInput("Service name cannot be empty".to_string()));
            }
            update_data.insert("name".to_string(), json!(name));
        }
        if let Some(category) = request.category {
            update_data.insert("category".to_string(), json!(category));
        }
        if let Some(duration) = request.duration_minutes {
            if duration <= 0 {
                return Err(ProviderError::InvalidInput("Duration must be positive".to_string()));
            }
            update_data.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(price) = request.price {
            if price <= Decimal::ZERO {
                return Err(ProviderError::InvalidInput("Price must be positive".to_string()));
            }
            update_data.insert("price".to_string(), json!(price));
        }
        if let Some(active) = request.active {
            update_data.insert("active".to_string(), json!(active));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!(
            "/rest/v1/service_offerings?id=eq.{}&provider_id=eq.{}",
            service_id, provider_id
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
            return Err(ProviderError::ServiceNotFound);
        }
        parse_single(result)
    }

    pub async fn get_service(
        &self,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<ServiceOffering, ProviderError> {
        debug!("Fetching service: {}", service_id);

        let path = format!("/rest/v1/service_offerings?id=eq.{}", service_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ProviderError::ServiceNotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse service: {}", e)))
    }

    pub async fn list_services(
        &self,
        provider_id: Uuid,
        include_inactive: bool,
        auth_token: &str,
    ) -> Result<Vec<ServiceOffering>, ProviderError> {
        let mut path = format!(
            "/rest/v1/service_offerings?provider_id=eq.{}&order=name.asc",
            provider_id
        );
        if !include_inactive {
            path.push_str("&active=eq.true");
        }

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ServiceOffering>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse services: {}", e)))
    }
}

fn validate_duration_and_price(duration_minutes: i32, price: Decimal) -> Result<(), ProviderError> {
    if duration_minutes <= 0 {
        return Err(ProviderError::InvalidInput("Duration must be positive".to_string()));
    }
    if price <= Decimal::ZERO {
        return Err(ProviderError::InvalidInput("Price must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(validate_duration_and_price(0, price("10.00")).is_err());
        assert!(validate_duration_and_price(-30, price("10.00")).is_err());
    }

    #[test]
    fn rejects_non_positive_price() {
        assert!(validate_duration_and_price(30, Decimal::ZERO).is_err());
    }

    #[test]
    fn accepts_valid_service_terms() {
        assert!(validate_duration_and_price(45, price("35.50")).is_ok());
    }
}
