use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateBlockedDateRequest, CreateProviderRequest, CreateServiceRequest, CreateStaffRequest,
    ProviderError, SetCancellationPolicyRequest, UpdateConstraintsRequest, UpdateServiceRequest,
    UpdateStaffRequest, UpsertWorkingHoursRequest,
};
use crate::services::{CatalogService, PolicyService, ProviderService, StaffService};

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StaffMetricsQuery {
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
}

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotFound => AppError::NotFound("Provider not found".to_string()),
        ProviderError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        ProviderError::StaffNotFound => AppError::NotFound("Staff member not found".to_string()),
        ProviderError::WorkingHoursConflict => {
            AppError::Conflict("Working hours conflict with an existing rule".to_string())
        }
        ProviderError::BlockedDateExists => {
            AppError::Conflict("Blocked date already exists".to_string())
        }
        ProviderError::InvalidInput(msg) => AppError::BadRequest(msg),
        ProviderError::Unauthorized => {
            AppError::Auth("Not authorized to manage this provider".to_string())
        }
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Management endpoints mutate a provider, so the caller must own it (or be
/// an admin).
async fn require_provider_owner(
    service: &ProviderService,
    provider_id: Uuid,
    user: &User,
    token: &str,
) -> Result<(), AppError> {
    let provider = service
        .get_provider(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    if provider.owner_id != user.id && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to manage this provider".to_string()));
    }
    Ok(())
}

// ==============================================================================
// PROVIDER HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_provider(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateProviderRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    let provider = service
        .create_provider(&user.id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}

#[axum::debug_handler]
pub async fn get_provider(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    let provider = service
        .get_provider(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!(provider)))
}

#[axum::debug_handler]
pub async fn update_constraints(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateConstraintsRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    require_provider_owner(&service, provider_id, &user, token).await?;

    let provider = service
        .update_constraints(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}

// ==============================================================================
// WORKING HOURS & BLOCKED DATES
// ==============================================================================

#[axum::debug_handler]
pub async fn upsert_working_hours(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertWorkingHoursRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    require_provider_owner(&service, provider_id, &user, token).await?;

    let hours = service
        .upsert_working_hours(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "working_hours": hours
    })))
}

#[axum::debug_handler]
pub async fn get_working_hours(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    let hours = service
        .get_working_hours(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "working_hours": hours })))
}

#[axum::debug_handler]
pub async fn create_blocked_date(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBlockedDateRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    require_provider_owner(&service, provider_id, &user, token).await?;

    let blocked = service
        .create_blocked_date(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "blocked_date": blocked
    })))
}

#[axum::debug_handler]
pub async fn delete_blocked_date(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, blocked_date_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = ProviderService::new(&state);

    require_provider_owner(&service, provider_id, &user, token).await?;

    service
        .delete_blocked_date(provider_id, blocked_date_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "success": true })))
}

// ==============================================================================
// SERVICE CATALOG
// ==============================================================================

#[axum::debug_handler]
pub async fn create_service(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let catalog = CatalogService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let service = catalog
        .create_service(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "service": service
    })))
}

#[axum::debug_handler]
pub async fn update_service(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, service_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let catalog = CatalogService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let service = catalog
        .update_service(provider_id, service_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "service": service
    })))
}

#[axum::debug_handler]
pub async fn list_services(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<ListServicesQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let catalog = CatalogService::new(&state);

    let services = catalog
        .list_services(provider_id, query.include_inactive.unwrap_or(false), token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "services": services })))
}

// ==============================================================================
// STAFF ROSTER
// ==============================================================================

#[axum::debug_handler]
pub async fn create_staff(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateStaffRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let staff_service = StaffService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let staff = staff_service
        .create_staff(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "staff": staff
    })))
}

#[axum::debug_handler]
pub async fn update_staff(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, staff_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStaffRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let staff_service = StaffService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let staff = staff_service
        .update_staff(provider_id, staff_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "staff": staff
    })))
}

#[axum::debug_handler]
pub async fn list_staff(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let staff_service = StaffService::new(&state);

    let staff = staff_service
        .list_staff(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "staff": staff })))
}

#[axum::debug_handler]
pub async fn staff_metrics(
    State(state): State<Arc<AppConfig>>,
    Path((provider_id, staff_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<StaffMetricsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let staff_service = StaffService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let metrics = staff_service
        .staff_metrics(provider_id, staff_id, query.from_date, query.to_date, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "metrics": metrics })))
}

// ==============================================================================
// CANCELLATION POLICY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_cancellation_policy(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let policy_service = PolicyService::new(&state);

    let policy = policy_service
        .get_policy(provider_id, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({ "policy": policy })))
}

#[axum::debug_handler]
pub async fn set_cancellation_policy(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetCancellationPolicyRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let provider_service = ProviderService::new(&state);
    let policy_service = PolicyService::new(&state);

    require_provider_owner(&provider_service, provider_id, &user, token).await?;

    let policy = policy_service
        .set_policy(provider_id, request, token)
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "success": true,
        "policy": policy
    })))
}
