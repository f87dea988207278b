use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl AppError {
    /// Stable machine-readable code; clients branch on this, not the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "UNAUTHENTICATED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "INVALID_INPUT",
            AppError::PolicyViolation(_) => "POLICY_VIOLATION",
            AppError::Conflict(_) => "SLOT_CONFLICT",
            AppError::InvalidState(_) => "INVALID_STATE_TRANSITION",
            AppError::ValidationError(_) => "INVALID_INPUT",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL",
            AppError::Database(_) => "DEPENDENCY_UNAVAILABLE",
            AppError::ExternalService(_) => "DEPENDENCY_UNAVAILABLE",
        }
    }

    /// Whether the caller may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Conflict(_) | AppError::Timeout(_) | AppError::ExternalService(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PolicyViolation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "code": self.code(),
            "error": message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
