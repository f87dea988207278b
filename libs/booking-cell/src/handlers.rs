use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{DateTime, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentSearchQuery, AppointmentStatus, AssignStaffRequest, BookAppointmentRequest,
    BookingError, CancelAppointmentRequest, RescheduleAppointmentRequest,
};
use crate::services::{BookingService, CancellationService, SlotService, StaffAssignmentService};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub date: NaiveDate,
    pub service_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub customer_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQueryParams {
    pub hours_ahead: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        BookingError::ProviderNotFound => AppError::NotFound("Provider not found".to_string()),
        BookingError::ServiceNotFound => AppError::NotFound("Service not found".to_string()),
        BookingError::ServiceInactive => {
            AppError::BadRequest("Service is not currently offered".to_string())
        }
        BookingError::InvalidInput(msg) => AppError::BadRequest(msg),
        BookingError::PolicyViolation(msg) => AppError::PolicyViolation(msg),
        BookingError::SlotConflict => {
            AppError::Conflict("Requested slot conflicts with an existing booking".to_string())
        }
        BookingError::InvalidStateTransition(status) => {
            AppError::InvalidState(format!("Appointment cannot change from {} status", status))
        }
        BookingError::NoActiveStaff => {
            AppError::BadRequest("Provider has no active staff members".to_string())
        }
        BookingError::Timeout => AppError::Timeout("Booking operation timed out".to_string()),
        BookingError::DependencyUnavailable(msg) => AppError::ExternalService(msg),
        BookingError::Unauthorized => {
            AppError::Auth("Not authorized to access this appointment".to_string())
        }
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

/// The single slot computation every caller goes through.
#[axum::debug_handler]
pub async fn generate_slots(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(params): Query<SlotQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let slot_service = SlotService::new(&state);

    let slots = slot_service
        .generate_slots(provider_id, params.date, params.service_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "date": params.date,
        "slots": slots
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Customers book for themselves; admins can book on their behalf.
    let is_customer = request.customer_id.to_string() == user.id;
    if !is_customer && !user.is_admin() {
        return Err(AppError::Auth("Not authorized to book for this customer".to_string()));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    let is_customer = appointment.customer_id.to_string() == user.id;
    if !is_customer && !user.is_admin() && !user.is_provider() {
        return Err(AppError::Auth("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Customers only see their own bookings.
    let customer_filter = if user.is_admin() || user.is_provider() {
        params.customer_id
    } else {
        Uuid::parse_str(&user.id).ok()
    };

    let query = AppointmentSearchQuery {
        customer_id: customer_filter,
        provider_id: params.provider_id,
        staff_id: params.staff_id,
        status: params.status,
        from_date: params.from_date,
        to_date: params.to_date,
        limit: params.limit,
        offset: params.offset,
    };

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .search_appointments(query, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "count": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<UpcomingQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let customer_id = Uuid::parse_str(&user.id).ok();

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .get_upcoming_appointments(customer_id, None, params.hours_ahead, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let current = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    let is_customer = current.customer_id.to_string() == user.id;
    if !is_customer && !user.is_admin() && !user.is_provider() {
        return Err(AppError::Auth("Not authorized to reschedule this appointment".to_string()));
    }

    let appointment = booking_service
        .reschedule_appointment(appointment_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = BookingService::new(&state);

    let current = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    let is_customer = current.customer_id.to_string() == user.id;
    if !is_customer && !user.is_admin() && !user.is_provider() {
        return Err(AppError::Auth("Not authorized to cancel this appointment".to_string()));
    }

    let cancellation_service = CancellationService::new(&state);
    let outcome = cancellation_service
        .cancel_appointment(appointment_id, request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "cancellation": outcome,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Auth("Only providers can confirm appointments".to_string()));
    }

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .confirm_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Auth("Only providers can complete appointments".to_string()));
    }

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .complete_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Auth("Only providers can record a no-show".to_string()));
    }

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .mark_no_show(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

// ==============================================================================
// STAFF ASSIGNMENT & STATS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn assign_staff(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AssignStaffRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Auth("Only providers can assign staff".to_string()));
    }

    let assignment_service = StaffAssignmentService::new(&state);
    let outcome = assignment_service
        .assign_staff(provider_id, request.strategy, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "strategy": request.strategy,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(params): Query<StatsQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_provider() && !user.is_admin() {
        return Err(AppError::Auth("Only providers can view appointment statistics".to_string()));
    }

    let booking_service = BookingService::new(&state);
    let stats = booking_service
        .get_appointment_stats(provider_id, params.from_date, params.to_date, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({ "stats": stats })))
}
