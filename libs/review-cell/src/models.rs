use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum length a review comment must reach to be stored.
pub const MIN_COMMENT_LENGTH: usize = 10;

/// One review per completed appointment; immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub provider_id: Uuid,
    pub customer_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub appointment_id: Uuid,
    pub rating: i32,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRatingSummary {
    pub provider_id: Uuid,
    pub review_count: usize,
    pub average_rating: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReviewError {
    #[error("Review not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Reviews can only be left on completed appointments")]
    AppointmentNotCompleted,

    #[error("Appointment already has a review")]
    AlreadyReviewed,

    #[error("Only the appointment's customer can leave a review")]
    NotAppointmentCustomer,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
