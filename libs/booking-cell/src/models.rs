use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub staff_id: Option<Uuid>,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    /// Snapshot of the service duration at booking time.
    pub duration_minutes: i32,
    /// Snapshot of the service price at booking time.
    pub price: Decimal,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub payment_ref: Option<String>,
    pub idempotency_key: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn date(&self) -> NaiveDate {
        self.scheduled_start_time.date_naive()
    }

    /// Whether this appointment occupies its slot for conflict purposes.
    pub fn holds_slot(&self) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Refunded,
    PartiallyRefunded,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Authorized => write!(f, "authorized"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::PartiallyRefunded => write!(f, "partially_refunded"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Customer,
    Provider,
    System,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// One candidate start time, with its availability verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub time: NaiveTime,
    pub available: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Caller-supplied token making retries safe; one logical booking
    /// attempt, one key.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    pub new_start_time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub appointment_id: Uuid,
    pub refund_percentage: u32,
    pub refund_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub customer_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total_appointments: i32,
    pub completed_appointments: i32,
    pub cancelled_appointments: i32,
    pub no_show_appointments: i32,
    pub completed_revenue: Decimal,
    pub cancellation_rate: f64,
}

// ==============================================================================
// STAFF ASSIGNMENT MODELS
// ==============================================================================

/// Closed set of assignment procedures. Every strategy except Random is
/// deterministic for a fixed appointment set and roster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Balanced,
    SkillBased,
    WorkloadPriority,
    Random,
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStrategy::Balanced => write!(f, "balanced"),
            AssignmentStrategy::SkillBased => write!(f, "skill_based"),
            AssignmentStrategy::WorkloadPriority => write!(f, "workload_priority"),
            AssignmentStrategy::Random => write!(f, "random"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignStaffRequest {
    pub strategy: AssignmentStrategy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffAssignment {
    pub appointment_id: Uuid,
    pub staff_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub assigned_count: usize,
    pub assignments: Vec<StaffAssignment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Service is not currently offered")]
    ServiceInactive,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Booking policy violation: {0}")]
    PolicyViolation(String),

    #[error("Requested slot conflicts with an existing booking")]
    SlotConflict,

    #[error("Appointment cannot change from {0} status")]
    InvalidStateTransition(AppointmentStatus),

    #[error("Provider has no active staff members")]
    NoActiveStaff,

    #[error("Operation timed out")]
    Timeout,

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Validation limits applied on top of per-provider constraints.
#[derive(Debug, Clone)]
pub struct BookingRules {
    pub max_idempotency_key_length: usize,
    pub operation_timeout_seconds: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_idempotency_key_length: 128,
            operation_timeout_seconds: 5,
        }
    }
}
