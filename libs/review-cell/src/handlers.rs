use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateReviewRequest, ReviewError};
use crate::services::ReviewService;

#[derive(Debug, Deserialize)]
pub struct ListReviewsQuery {
    pub limit: Option<i32>,
}

fn map_review_error(e: ReviewError) -> AppError {
    match e {
        ReviewError::NotFound => AppError::NotFound("Review not found".to_string()),
        ReviewError::AppointmentNotFound => AppError::NotFound("Appointment not found".to_string()),
        ReviewError::AppointmentNotCompleted => {
            AppError::InvalidState("Reviews can only be left on completed appointments".to_string())
        }
        ReviewError::AlreadyReviewed => {
            AppError::Conflict("Appointment already has a review".to_string())
        }
        ReviewError::NotAppointmentCustomer => {
            AppError::Auth("Only the appointment's customer can leave a review".to_string())
        }
        ReviewError::InvalidInput(msg) => AppError::BadRequest(msg),
        ReviewError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_review(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateReviewRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let customer_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid user identity".to_string()))?;

    let review_service = ReviewService::new(&state);
    let review = review_service
        .create_review(customer_id, request, token)
        .await
        .map_err(map_review_error)?;

    Ok(Json(json!({
        "success": true,
        "review": review
    })))
}

#[axum::debug_handler]
pub async fn list_provider_reviews(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<ListReviewsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let review_service = ReviewService::new(&state);

    let reviews = review_service
        .list_provider_reviews(provider_id, query.limit, token)
        .await
        .map_err(map_review_error)?;

    Ok(Json(json!({
        "reviews": reviews,
        "count": reviews.len()
    })))
}

#[axum::debug_handler]
pub async fn provider_rating_summary(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let review_service = ReviewService::new(&state);

    let summary = review_service
        .provider_rating_summary(provider_id, token)
        .await
        .map_err(map_review_error)?;

    Ok(Json(json!({ "summary": summary })))
}
