use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CustomerError, SetPreferenceRequest, UpsertProfileRequest};
use crate::services::{PreferenceService, ProfileService};

fn map_customer_error(e: CustomerError) -> AppError {
    match e {
        CustomerError::ProfileNotFound => AppError::NotFound("Profile not found".to_string()),
        CustomerError::PreferenceNotFound => AppError::NotFound("Preference not found".to_string()),
        CustomerError::InvalidInput(msg) => AppError::BadRequest(msg),
        CustomerError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user identity".to_string()))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let profile_service = ProfileService::new(&state);
    let profile = profile_service
        .get_profile(user_id, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn upsert_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let profile_service = ProfileService::new(&state);
    let profile = profile_service
        .upsert_profile(user_id, request, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!({
        "success": true,
        "profile": profile
    })))
}

#[axum::debug_handler]
pub async fn list_preferences(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let preference_service = PreferenceService::new(&state);
    let preferences = preference_service
        .list_preferences(user_id, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!({ "preferences": preferences })))
}

#[axum::debug_handler]
pub async fn get_preference(
    State(state): State<Arc<AppConfig>>,
    Path(key): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let preference_service = PreferenceService::new(&state);
    let preference = preference_service
        .get_preference(user_id, &key, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!(preference)))
}

#[axum::debug_handler]
pub async fn set_preference(
    State(state): State<Arc<AppConfig>>,
    Path(key): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetPreferenceRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let preference_service = PreferenceService::new(&state);
    let preference = preference_service
        .set_preference(user_id, &key, request.value, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!({
        "success": true,
        "preference": preference
    })))
}

#[axum::debug_handler]
pub async fn delete_preference(
    State(state): State<Arc<AppConfig>>,
    Path(key): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let user_id = user_uuid(&user)?;

    let preference_service = PreferenceService::new(&state);
    preference_service
        .delete_preference(user_id, &key, token)
        .await
        .map_err(map_customer_error)?;

    Ok(Json(json!({ "success": true })))
}
