use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::{BlockedDate, Provider, WorkingHours};
use provider_cell::services::{CatalogService, ProviderService};
use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{Appointment, BookingError, TimeSlot};
use crate::services::conflict::{intervals_overlap, ConflictDetectionService};

/// Candidate start times are generated on a fixed grid.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// Discrete candidate start times for one working-hours rule: every grid
/// step from opening such that the service still finishes by closing.
/// Returns an empty sequence for a closed day.
pub fn generate_time_grid(hours: &WorkingHours, duration_minutes: i32) -> Vec<NaiveTime> {
    if hours.is_closed || duration_minutes <= 0 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    let mut current = hours.open_time;
    let duration = Duration::minutes(duration_minutes as i64);
    let step = Duration::minutes(SLOT_STEP_MINUTES);

    loop {
        let end = current.overflowing_add_signed(duration);
        // overflowing_add_signed wraps past midnight; the wrap flag tells us
        // the service would run over the end of the day.
        if end.1 != 0 || end.0 > hours.close_time {
            break;
        }

        candidates.push(current);

        let next = current.overflowing_add_signed(step);
        if next.1 != 0 || next.0 <= current {
            break;
        }
        current = next.0;
    }

    candidates
}

/// Everything the availability filter needs to judge one day's candidates.
#[derive(Debug, Clone)]
pub struct AvailabilityContext<'a> {
    pub date: NaiveDate,
    pub existing: &'a [Appointment],
    pub blocked: &'a [BlockedDate],
    pub buffer_minutes: i32,
    pub min_notice_minutes: i32,
    pub max_advance_days: i32,
    pub now: DateTime<Utc>,
}

/// Mark each candidate available or not. A candidate is unavailable when it
/// overlaps a buffer-extended Scheduled/Confirmed appointment, falls in a
/// blocked window, starts before the notice cutoff, or starts beyond the
/// advance horizon. Pure; running it twice on the same input yields the same
/// output.
pub fn filter_slots(
    candidates: &[NaiveTime],
    duration_minutes: i32,
    ctx: &AvailabilityContext<'_>,
) -> Vec<TimeSlot> {
    let duration = Duration::minutes(duration_minutes as i64);
    let buffer = Duration::minutes(ctx.buffer_minutes.max(0) as i64);
    let notice_cutoff = ctx.now + Duration::minutes(ctx.min_notice_minutes.max(0) as i64);
    let advance_cutoff = ctx.now + Duration::days(ctx.max_advance_days.max(0) as i64);

    let full_day_blocked = ctx.blocked.iter().any(BlockedDate::is_full_day);

    candidates
        .iter()
        .map(|&time| {
            let start = ctx.date.and_time(time).and_utc();
            let end = start + duration;

            let mut available = true;

            if start < notice_cutoff || start > advance_cutoff {
                available = false;
            }

            if available && full_day_blocked {
                available = false;
            }

            if available {
                let in_blocked_window = ctx.blocked.iter().any(|block| {
                    match (block.start_time, block.end_time) {
                        (Some(block_start), Some(block_end)) => {
                            let block_start = ctx.date.and_time(block_start).and_utc();
                            let block_end = ctx.date.and_time(block_end).and_utc();
                            intervals_overlap(start, end, block_start, block_end)
                        }
                        _ => false,
                    }
                });
                if in_blocked_window {
                    available = false;
                }
            }

            if available {
                let conflicts = ctx.existing.iter().any(|apt| {
                    apt.holds_slot()
                        && intervals_overlap(
                            start,
                            end,
                            apt.scheduled_start_time - buffer,
                            apt.scheduled_end_time + buffer,
                        )
                });
                if conflicts {
                    available = false;
                }
            }

            TimeSlot { time, available }
        })
        .collect()
}

pub fn weekday_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Loads the provider's rules and live appointment set, then runs the grid
/// generator and the availability filter. Any UI needing slots goes through
/// here; there is exactly one slot computation in the system.
pub struct SlotService {
    provider_service: ProviderService,
    catalog_service: CatalogService,
    conflict_service: ConflictDetectionService,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        Self {
            provider_service: ProviderService::with_store(Arc::clone(&store)),
            catalog_service: CatalogService::with_store(Arc::clone(&store)),
            conflict_service: ConflictDetectionService::new(store),
        }
    }

    /// `generateSlots(providerId, date, serviceId)`.
    pub async fn generate_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        self.generate_slots_at(provider_id, date, service_id, Utc::now(), auth_token)
            .await
    }

    /// Same as `generate_slots` with an explicit "now" so the notice and
    /// advance cutoffs are testable.
    pub async fn generate_slots_at(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        service_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        debug!("Generating slots for provider {} on {} (service {})", provider_id, date, service_id);

        let provider = self.get_provider(provider_id, auth_token).await?;
        let service = self.get_active_service(&provider, service_id, auth_token).await?;

        let hours = self
            .provider_service
            .get_working_hours_for_weekday(provider_id, weekday_index(date), auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let Some(hours) = hours else {
            debug!("Provider {} is closed on {}", provider_id, date);
            return Ok(Vec::new());
        };

        let candidates = generate_time_grid(&hours, service.duration_minutes);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let existing = self
            .conflict_service
            .get_provider_appointments_for_date(provider_id, date, None, auth_token)
            .await?;

        let blocked = self
            .provider_service
            .get_blocked_dates_for_date(provider_id, date, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let ctx = AvailabilityContext {
            date,
            existing: &existing,
            blocked: &blocked,
            buffer_minutes: provider.buffer_minutes,
            min_notice_minutes: provider.min_notice_minutes,
            max_advance_days: provider.max_advance_days,
            now,
        };

        let slots = filter_slots(&candidates, service.duration_minutes, &ctx);
        debug!(
            "Generated {} candidates ({} available) for provider {} on {}",
            slots.len(),
            slots.iter().filter(|s| s.available).count(),
            provider_id,
            date
        );
        Ok(slots)
    }

    pub(crate) async fn get_provider(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Provider, BookingError> {
        self.provider_service
            .get_provider(provider_id, auth_token)
            .await
            .map_err(|e| match e {
                provider_cell::models::ProviderError::NotFound => BookingError::ProviderNotFound,
                other => BookingError::DatabaseError(other.to_string()),
            })
    }

    pub(crate) async fn get_active_service(
        &self,
        provider: &Provider,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<provider_cell::models::ServiceOffering, BookingError> {
        let service = self
            .catalog_service
            .get_service(service_id, auth_token)
            .await
            .map_err(|e| match e {
                provider_cell::models::ProviderError::ServiceNotFound => BookingError::ServiceNotFound,
                other => BookingError::DatabaseError(other.to_string()),
            })?;

        if service.provider_id != provider.id {
            return Err(BookingError::ServiceNotFound);
        }
        if !service.active {
            return Err(BookingError::ServiceInactive);
        }
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, PaymentStatus};
    use rust_decimal::Decimal;

    fn hours(open: (u32, u32), close: (u32, u32)) -> WorkingHours {
        let now = Utc::now();
        WorkingHours {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            weekday: 1,
            open_time: NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap(),
            is_closed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn appointment(date: NaiveDate, start: (u32, u32), end: (u32, u32), status: AppointmentStatus) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            staff_id: None,
            scheduled_start_time: date
                .and_time(NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap())
                .and_utc(),
            scheduled_end_time: date
                .and_time(NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap())
                .and_utc(),
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

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn test_date() -> NaiveDate {
        // A Monday, far enough ahead of the tests' fixed "now".
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn ctx<'a>(
        date: NaiveDate,
        existing: &'a [Appointment],
        blocked: &'a [BlockedDate],
        buffer: i32,
    ) -> AvailabilityContext<'a> {
        AvailabilityContext {
            date,
            existing,
            blocked,
            buffer_minutes: buffer,
            min_notice_minutes: 120,
            max_advance_days: 90,
            now: NaiveDate::from_ymd_opt(2025, 6, 1)
                .unwrap()
                .and_time(t(12, 0))
                .and_utc(),
        }
    }

    #[test]
    fn grid_last_candidate_respects_closing_time() {
        // 09:00-18:00 with a 60-minute service: last valid start is 17:00,
        // because 17:30 + 60 would run past closing.
        let candidates = generate_time_grid(&hours((9, 0), (18, 0)), 60);
        assert_eq!(candidates.first(), Some(&t(9, 0)));
        assert_eq!(candidates.last(), Some(&t(17, 0)));
        assert!(!candidates.contains(&t(17, 30)));
        assert_eq!(candidates.len(), 17);
    }

    #[test]
    fn grid_empty_for_closed_day() {
        let mut rule = hours((9, 0), (18, 0));
        rule.is_closed = true;
        assert!(generate_time_grid(&rule, 30).is_empty());
    }

    #[test]
    fn grid_empty_when_service_longer_than_day() {
        assert!(generate_time_grid(&hours((9, 0), (10, 0)), 90).is_empty());
    }

    #[test]
    fn filter_blocks_buffer_extended_overlaps() {
        // Existing confirmed 10:00-11:00 with a 15-minute buffer blocks every
        // start before 11:15; 11:15 itself is bookable. Grid step is 30, so
        // exercise the engine's own interval check with explicit candidates.
        let date = test_date();
        let existing = vec![appointment(date, (10, 0), (11, 0), AppointmentStatus::Confirmed)];
        let candidates = vec![t(10, 45), t(11, 0), t(11, 15), t(11, 30)];

        let slots = filter_slots(&candidates, 30, &ctx(date, &existing, &[], 15));

        assert!(!slots[0].available); // 10:45 overlaps the booking itself
        assert!(!slots[1].available); // 11:00 falls inside the trailing buffer
        assert!(slots[2].available); // 11:15 clears 11:00 + 15min
        assert!(slots[3].available);
    }

    #[test]
    fn filter_ignores_cancelled_appointments() {
        let date = test_date();
        let existing = vec![appointment(date, (10, 0), (11, 0), AppointmentStatus::Cancelled)];
        let slots = filter_slots(&[t(10, 0)], 30, &ctx(date, &existing, &[], 0));
        assert!(slots[0].available);
    }

    #[test]
    fn filter_removes_full_day_block() {
        let date = test_date();
        let blocked = vec![BlockedDate {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            date,
            start_time: None,
            end_time: None,
            reason: Some("renovation".to_string()),
            created_at: Utc::now(),
        }];
        let slots = filter_slots(&[t(9, 0), t(14, 0)], 30, &ctx(date, &[], &blocked, 0));
        assert!(slots.iter().all(|s| !s.available));
    }

    #[test]
    fn filter_removes_partial_block_window_only() {
        let date = test_date();
        let blocked = vec![BlockedDate {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            date,
            start_time: Some(t(12, 0)),
            end_time: Some(t(14, 0)),
            reason: None,
            created_at: Utc::now(),
        }];
        let slots = filter_slots(&[t(11, 30), t(12, 30), t(13, 30), t(14, 0)], 30, &ctx(date, &[], &blocked, 0));
        assert!(slots[0].available); // ends exactly at 12:00, half-open
        assert!(!slots[1].available);
        assert!(!slots[2].available);
        assert!(slots[3].available); // starts exactly at block end
    }

    #[test]
    fn filter_enforces_notice_and_advance_windows() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_time(t(9, 0))
            .and_utc();
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let ctx = AvailabilityContext {
            date,
            existing: &[],
            blocked: &[],
            buffer_minutes: 0,
            min_notice_minutes: 120,
            max_advance_days: 90,
            now,
        };
        let slots = filter_slots(&[t(10, 0), t(11, 0), t(11, 30)], 30, &ctx);
        assert!(!slots[0].available); // inside now + 2h
        assert!(slots[1].available); // exactly at the cutoff
        assert!(slots[2].available);

        let far_date = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let far_ctx = AvailabilityContext { date: far_date, ..ctx };
        let far_slots = filter_slots(&[t(10, 0)], 30, &far_ctx);
        assert!(!far_slots[0].available); // beyond 90 days out
    }

    #[test]
    fn filter_is_idempotent() {
        let date = test_date();
        let existing = vec![appointment(date, (10, 0), (11, 0), AppointmentStatus::Scheduled)];
        let candidates = generate_time_grid(&hours((9, 0), (18, 0)), 30);
        let context = ctx(date, &existing, &[], 15);

        let first = filter_slots(&candidates, 30, &context);
        let second = filter_slots(&candidates, 30, &context);
        assert_eq!(first, second);
    }
}
