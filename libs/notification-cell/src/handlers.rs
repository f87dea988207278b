use std::sync::Arc;

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::NotificationError;
use crate::services::{DispatchService, NotificationSweepService};

#[derive(Debug, Deserialize)]
pub struct OutboxQueryParams {
    pub limit: Option<i32>,
}

fn map_notification_error(e: NotificationError) -> AppError {
    match e {
        NotificationError::NotFound => AppError::NotFound("Notification not found".to_string()),
        NotificationError::NoContactDetails => {
            AppError::BadRequest("Customer has no reachable contact details".to_string())
        }
        NotificationError::TransmissionFailed(msg) => AppError::ExternalService(msg),
        NotificationError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Recent outbox entries; admin-only bookkeeping view.
#[axum::debug_handler]
pub async fn list_outbox(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<OutboxQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Only admins can inspect the outbox".to_string()));
    }

    let token = auth.token();
    let dispatch_service = DispatchService::new(&state);

    let records = dispatch_service
        .list_recent(params.limit.unwrap_or(50), token)
        .await
        .map_err(map_notification_error)?;

    Ok(Json(json!({
        "notifications": records,
        "count": records.len()
    })))
}

/// Trigger one sweep pass out of band; admin-only.
#[axum::debug_handler]
pub async fn run_sweep(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Only admins can trigger a sweep".to_string()));
    }

    let sweep = NotificationSweepService::new(&state, 0);
    let summary = sweep.sweep_once().await.map_err(map_notification_error)?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}
