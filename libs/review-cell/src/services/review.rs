use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{
    CreateReviewRequest, ProviderRatingSummary, Review, ReviewError, MIN_COMMENT_LENGTH,
};

pub struct ReviewService {
    store: Arc<StoreClient>,
}

impl ReviewService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    /// Create a review. Only the appointment's customer may review, only a
    /// completed appointment qualifies, and each appointment takes at most
    /// one review.
    pub async fn create_review(
        &self,
        customer_id: Uuid,
        request: CreateReviewRequest,
        auth_token: &str,
    ) -> Result<Review, ReviewError> {
        validate_review_input(request.rating, &request.comment)?;

        let appointment = self
            .get_appointment(request.appointment_id, auth_token)
            .await?;

        let apt_customer = appointment["customer_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok());
        if apt_customer != Some(customer_id) {
            return Err(ReviewError::NotAppointmentCustomer);
        }

        if appointment["status"].as_str() != Some("completed") {
            return Err(ReviewError::AppointmentNotCompleted);
        }

        if self.review_exists(request.appointment_id, auth_token).await? {
            return Err(ReviewError::AlreadyReviewed);
        }

        let provider_id = appointment["provider_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ReviewError::DatabaseError("Appointment has no provider".to_string()))?;

        let review_data = json!({
            "appointment_id": request.appointment_id,
            "provider_id": provider_id,
            "customer_id": customer_id,
            "rating": request.rating,
            "comment": request.comment,
            "created_at": Utc::now().to_rfc3339()
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
                "/rest/v1/reviews",
                Some(auth_token),
                Some(review_data),
                Some(headers),
            )
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(ReviewError::DatabaseError("Failed to create review".to_string()));
        }

        let review: Review = serde_json::from_value(result[0].clone())
            .map_err(|e| ReviewError::DatabaseError(format!("Failed to parse review: {}", e)))?;

        info!("Review {} created for appointment {}", review.id, request.appointment_id);
        Ok(review)
    }

    pub async fn list_provider_reviews(
        &self,
        provider_id: Uuid,
        limit: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Review>, ReviewError> {
        let mut path = format!(
            "/rest/v1/reviews?provider_id=eq.{}&order=created_at.desc",
            provider_id
        );
        if let Some(limit) = limit {
            path.push_str(&format!("&limit={}", limit));
        }

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Review>, _>>()
            .map_err(|e| ReviewError::DatabaseError(format!("Failed to parse reviews: {}", e)))
    }

    /// Rating summary derived from the stored reviews on every call.
    pub async fn provider_rating_summary(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<ProviderRatingSummary, ReviewError> {
        let reviews = self
            .list_provider_reviews(provider_id, None, auth_token)
            .await?;

        let review_count = reviews.len();
        let average_rating = if review_count > 0 {
            reviews.iter().map(|r| r.rating as f64).sum::<f64>() / review_count as f64
        } else {
            0.0
        };

        Ok(ProviderRatingSummary {
            provider_id,
            review_count,
            average_rating,
        })
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, ReviewError> {
        debug!("Fetching appointment {} for review", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(ReviewError::AppointmentNotFound)
    }

    async fn review_exists(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, ReviewError> {
        let path = format!(
            "/rest/v1/reviews?appointment_id=eq.{}&limit=1",
            appointment_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ReviewError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }
}

fn validate_review_input(rating: i32, comment: &str) -> Result<(), ReviewError> {
    if !(1..=5).contains(&rating) {
        return Err(ReviewError::InvalidInput(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if comment.trim().chars().count() < MIN_COMMENT_LENGTH {
        return Err(ReviewError::InvalidInput(format!(
            "Comment must be at least {} characters",
            MIN_COMMENT_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(validate_review_input(0, "long enough comment").is_err());
        assert!(validate_review_input(6, "long enough comment").is_err());
        assert!(validate_review_input(1, "long enough comment").is_ok());
        assert!(validate_review_input(5, "long enough comment").is_ok());
    }

    #[test]
    fn comment_minimum_length_enforced() {
        assert!(validate_review_input(4, "too short").is_err());
        assert!(validate_review_input(4, "          ").is_err());
        assert!(validate_review_input(4, "this one clears the bar").is_ok());
    }
}
