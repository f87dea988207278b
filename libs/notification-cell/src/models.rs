use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// DOMAIN EVENTS
// ==============================================================================

/// Events that require an outbound message. The dispatch gate maps each to
/// channel-specific payloads; nothing else in the system renders templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    BookingCreated {
        appointment_id: Uuid,
        provider_id: Uuid,
        customer_id: Uuid,
        provider_name: String,
        service_name: String,
        start_time: DateTime<Utc>,
    },
    BookingCancelled {
        appointment_id: Uuid,
        provider_id: Uuid,
        customer_id: Uuid,
        provider_name: String,
        start_time: DateTime<Utc>,
        refund_percentage: u32,
        refund_amount: Decimal,
    },
    BookingRescheduled {
        appointment_id: Uuid,
        provider_id: Uuid,
        customer_id: Uuid,
        provider_name: String,
        old_start_time: DateTime<Utc>,
        new_start_time: DateTime<Utc>,
    },
    ReminderDue {
        appointment_id: Uuid,
        provider_id: Uuid,
        customer_id: Uuid,
        provider_name: String,
        start_time: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::BookingCreated { .. } => "booking_created",
            NotificationEvent::BookingCancelled { .. } => "booking_cancelled",
            NotificationEvent::BookingRescheduled { .. } => "booking_rescheduled",
            NotificationEvent::ReminderDue { .. } => "reminder_due",
        }
    }

    pub fn customer_id(&self) -> Uuid {
        match self {
            NotificationEvent::BookingCreated { customer_id, .. }
            | NotificationEvent::BookingCancelled { customer_id, .. }
            | NotificationEvent::BookingRescheduled { customer_id, .. }
            | NotificationEvent::ReminderDue { customer_id, .. } => *customer_id,
        }
    }

    pub fn appointment_id(&self) -> Uuid {
        match self {
            NotificationEvent::BookingCreated { appointment_id, .. }
            | NotificationEvent::BookingCancelled { appointment_id, .. }
            | NotificationEvent::BookingRescheduled { appointment_id, .. }
            | NotificationEvent::ReminderDue { appointment_id, .. } => *appointment_id,
        }
    }
}

// ==============================================================================
// CHANNELS, LOCALES, RENDERING
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "zh" | "zh-cn" | "zh-hans" => Locale::Zh,
            _ => Locale::En,
        }
    }
}

/// A fully rendered, channel-ready payload; transmission collaborators get
/// exactly this plus a destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub text: String,
    pub html: Option<String>,
}

// ==============================================================================
// OUTBOX
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Retry bookkeeping for one outbound message. Dispatch is fire-and-forget
/// for the caller; the sweep re-attempts Pending/Failed rows whose
/// `scheduled_for` has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub event_type: String,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub html_body: Option<String>,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    pub last_error: Option<String>,
    pub delivery_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn can_retry(&self) -> bool {
        self.status != NotificationStatus::Sent && self.attempts < self.max_attempts
    }
}

/// Destination data resolved per customer before rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification record not found")]
    NotFound,

    #[error("Customer has no reachable contact details")]
    NoContactDetails,

    #[error("Transmission failed: {0}")]
    TransmissionFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
