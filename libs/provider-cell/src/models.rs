use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// PROVIDER MODELS
// ==============================================================================

/// A bookable provider (salon, studio, independent professional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub timezone: String,
    /// Minutes kept free around every appointment.
    pub buffer_minutes: i32,
    /// Customers cannot book closer to "now" than this.
    pub min_notice_minutes: i32,
    /// Customers cannot book further out than this.
    pub max_advance_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Weekly opening rule. One row per weekday; `is_closed` overrides the times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: i32,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A one-off closure: full day when no window is given, otherwise the
/// overlapping part of the day only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDate {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlockedDate {
    pub fn is_full_day(&self) -> bool {
        self.start_time.is_none() || self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub category: String,
    pub duration_minutes: i32,
    pub price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    pub specialties: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StaffMember {
    /// Tag match used by skill-based assignment; case-insensitive.
    pub fn matches_category(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.specialties
            .iter()
            .any(|tag| tag.to_lowercase() == category)
    }

    pub fn is_generalist(&self) -> bool {
        self.specialties.is_empty()
    }
}

/// Derived per-period staff figures; computed from appointments, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMetrics {
    pub staff_id: Uuid,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
    pub appointment_count: i32,
    pub completed_count: i32,
    pub revenue: Decimal,
}

// ==============================================================================
// CANCELLATION POLICY
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundTier {
    /// Cancelling at least this many hours ahead earns the tier.
    pub hours_before: i64,
    pub refund_percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub tiers: Vec<RefundTier>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CancellationPolicy {
    /// The marketplace default: full refund a day out, half within the day,
    /// nothing inside two hours.
    pub fn default_tiers() -> Vec<RefundTier> {
        vec![
            RefundTier { hours_before: 24, refund_percentage: 100 },
            RefundTier { hours_before: 2, refund_percentage: 50 },
            RefundTier { hours_before: 0, refund_percentage: 0 },
        ]
    }

    /// Tiers ordered for nearest-met-threshold evaluation.
    pub fn sorted_tiers(&self) -> Vec<RefundTier> {
        let mut tiers = self.tiers.clone();
        tiers.sort_by(|a, b| b.hours_before.cmp(&a.hours_before));
        tiers
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub timezone: Option<String>,
    pub buffer_minutes: Option<i32>,
    pub min_notice_minutes: Option<i32>,
    pub max_advance_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConstraintsRequest {
    pub buffer_minutes: Option<i32>,
    pub min_notice_minutes: Option<i32>,
    pub max_advance_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertWorkingHoursRequest {
    pub weekday: i32,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub is_closed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockedDateRequest {
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub category: String,
    pub duration_minutes: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub duration_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStaffRequest {
    pub name: String,
    pub specialties: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStaffRequest {
    pub name: Option<String>,
    pub specialties: Option<Vec<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCancellationPolicyRequest {
    pub tiers: Vec<RefundTier>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not found")]
    NotFound,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Staff member not found")]
    StaffNotFound,

    #[error("Working hours conflict with an existing rule")]
    WorkingHoursConflict,

    #[error("Blocked date already exists for this date")]
    BlockedDateExists,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized access to provider")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl fmt::Display for RefundTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">={}h -> {}%", self.hours_before, self.refund_percentage)
    }
}
