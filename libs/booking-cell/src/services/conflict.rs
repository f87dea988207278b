use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::store::StoreClient;

use crate::models::{Appointment, BookingError};

/// Half-open interval overlap: [a,b) and [c,d) overlap iff a < d && c < b.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Conflict checks against the live appointment set. Only Scheduled and
/// Confirmed appointments hold their slot; terminal ones never conflict.
pub struct ConflictDetectionService {
    store: Arc<StoreClient>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// All slot-holding appointments for a provider on one date, start-time
    /// ascending. `exclude_appointment_id` lets reschedules ignore themselves.
    pub async fn get_provider_appointments_for_date(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let start_of_day = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end_of_day = start_of_day + Duration::days(1);

        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!(
                "scheduled_start_time=gte.{}",
                urlencoding::encode(&start_of_day.to_rfc3339())
            ),
            format!(
                "scheduled_start_time=lt.{}",
                urlencoding::encode(&end_of_day.to_rfc3339())
            ),
            "status=in.(scheduled,confirmed)".to_string(),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=scheduled_start_time.asc",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    /// Find every existing appointment whose buffer-extended interval
    /// overlaps the candidate window.
    pub async fn check_conflicts(
        &self,
        provider_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        buffer_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        debug!(
            "Checking conflicts for provider {} from {} to {} (buffer {}m)",
            provider_id, start_time, end_time, buffer_minutes
        );

        let existing = self
            .get_provider_appointments_for_date(
                provider_id,
                start_time.date_naive(),
                exclude_appointment_id,
                auth_token,
            )
            .await?;

        let conflicting = find_conflicts(&existing, start_time, end_time, buffer_minutes);

        if !conflicting.is_empty() {
            warn!(
                "Conflict detected for provider {} - {} overlapping appointments",
                provider_id,
                conflicting.len()
            );
        }

        Ok(conflicting)
    }
}

/// Pure core of the conflict check, shared with the availability filter tests
/// and the assignment engine's staff-level exclusivity check.
pub fn find_conflicts(
    existing: &[Appointment],
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    buffer_minutes: i32,
) -> Vec<Appointment> {
    let buffer = Duration::minutes(buffer_minutes.max(0) as i64);

    existing
        .iter()
        .filter(|apt| {
            apt.holds_slot()
                && intervals_overlap(
                    start_time,
                    end_time,
                    apt.scheduled_start_time - buffer,
                    apt.scheduled_end_time + buffer,
                )
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, PaymentStatus};
    use chrono::NaiveTime;
    use rust_decimal::Decimal;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
            .and_utc()
    }

    fn appointment(start: DateTime<Utc>, end: DateTime<Utc>, status: AppointmentStatus) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            staff_id: None,
            scheduled_start_time: start,
            scheduled_end_time: end,
            duration_minutes: 60,
            price: Decimal::from_str_exact("45.00").unwrap(),
            status,
            payment_status: PaymentStatus::Authorized,
            payment_ref: None,
            idempotency_key: Uuid::new_v4().to_string(),
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn half_open_intervals_touching_do_not_overlap() {
        assert!(!intervals_overlap(at(10, 0), at(11, 0), at(11, 0), at(12, 0)));
        assert!(!intervals_overlap(at(11, 0), at(12, 0), at(10, 0), at(11, 0)));
        assert!(intervals_overlap(at(10, 0), at(11, 1), at(11, 0), at(12, 0)));
    }

    #[test]
    fn containment_counts_as_overlap() {
        assert!(intervals_overlap(at(10, 0), at(12, 0), at(10, 30), at(11, 0)));
        assert!(intervals_overlap(at(10, 30), at(11, 0), at(10, 0), at(12, 0)));
    }

    #[test]
    fn terminal_appointments_never_conflict() {
        let existing = vec![
            appointment(at(10, 0), at(11, 0), AppointmentStatus::Cancelled),
            appointment(at(10, 0), at(11, 0), AppointmentStatus::Completed),
            appointment(at(10, 0), at(11, 0), AppointmentStatus::NoShow),
        ];
        assert!(find_conflicts(&existing, at(10, 0), at(11, 0), 0).is_empty());
    }

    #[test]
    fn buffer_extends_existing_interval_both_sides() {
        let existing = vec![appointment(at(10, 0), at(11, 0), AppointmentStatus::Confirmed)];

        // 09:30-10:00 touches only through the leading buffer.
        assert_eq!(find_conflicts(&existing, at(9, 30), at(10, 0), 15).len(), 1);
        assert!(find_conflicts(&existing, at(9, 30), at(10, 0), 0).is_empty());

        // 11:00-11:15 sits wholly inside the trailing buffer.
        assert_eq!(find_conflicts(&existing, at(11, 0), at(11, 15), 15).len(), 1);
        assert!(find_conflicts(&existing, at(11, 15), at(11, 45), 15).is_empty());
    }
}
