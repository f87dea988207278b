use rand::seq::SliceRandom;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use provider_cell::models::StaffMember;
use provider_cell::services::StaffService;
use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{
    Appointment, AssignmentOutcome, AssignmentStrategy, BookingError, StaffAssignment,
};
use crate::services::conflict::intervals_overlap;
use crate::services::locks::SlotLockService;

/// Tracks which intervals each staff member already holds so no strategy can
/// double-book an individual person.
struct StaffLoad {
    busy: HashMap<Uuid, Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>>,
    counts: HashMap<Uuid, usize>,
}

impl StaffLoad {
    fn seed(roster: &[StaffMember], already_assigned: &[Appointment]) -> Self {
        let mut busy: HashMap<Uuid, Vec<_>> = HashMap::new();
        let mut counts: HashMap<Uuid, usize> = HashMap::new();

        for staff in roster {
            busy.entry(staff.id).or_default();
            counts.entry(staff.id).or_insert(0);
        }

        for apt in already_assigned {
            if !apt.holds_slot() {
                continue;
            }
            if let Some(staff_id) = apt.staff_id {
                busy.entry(staff_id)
                    .or_default()
                    .push((apt.scheduled_start_time, apt.scheduled_end_time));
                *counts.entry(staff_id).or_insert(0) += 1;
            }
        }

        Self { busy, counts }
    }

    fn can_take(&self, staff_id: Uuid, apt: &Appointment) -> bool {
        self.busy
            .get(&staff_id)
            .map(|intervals| {
                !intervals.iter().any(|&(start, end)| {
                    intervals_overlap(apt.scheduled_start_time, apt.scheduled_end_time, start, end)
                })
            })
            .unwrap_or(true)
    }

    fn record(&mut self, staff_id: Uuid, apt: &Appointment) {
        self.busy
            .entry(staff_id)
            .or_default()
            .push((apt.scheduled_start_time, apt.scheduled_end_time));
        *self.counts.entry(staff_id).or_insert(0) += 1;
    }

    fn count(&self, staff_id: Uuid) -> usize {
        self.counts.get(&staff_id).copied().unwrap_or(0)
    }
}

/// Pure assignment procedure: given the unassigned appointments (start-time
/// ascending), the active roster (stable order), the already-assigned set,
/// and each appointment's service category, produce the (appointment ->
/// staff) changes. Deterministic for every strategy except Random.
pub fn compute_assignments(
    strategy: AssignmentStrategy,
    unassigned: &[Appointment],
    roster: &[StaffMember],
    already_assigned: &[Appointment],
    categories: &HashMap<Uuid, String>,
) -> Vec<StaffAssignment> {
    if roster.is_empty() {
        return Vec::new();
    }

    let mut load = StaffLoad::seed(roster, already_assigned);
    let mut assignments = Vec::new();
    let mut rotation = 0usize;

    for apt in unassigned {
        let pick = match strategy {
            AssignmentStrategy::Balanced => pick_round_robin(roster, &load, apt, &mut rotation),
            AssignmentStrategy::SkillBased => pick_by_skill(roster, &load, apt, categories),
            AssignmentStrategy::WorkloadPriority => pick_least_loaded(roster, &load, apt),
            AssignmentStrategy::Random => pick_random(roster, &load, apt),
        };

        if let Some(staff_id) = pick {
            load.record(staff_id, apt);
            assignments.push(StaffAssignment {
                appointment_id: apt.id,
                staff_id,
            });
        }
    }

    assignments
}

fn pick_round_robin(
    roster: &[StaffMember],
    load: &StaffLoad,
    apt: &Appointment,
    rotation: &mut usize,
) -> Option<Uuid> {
    for offset in 0..roster.len() {
        let candidate = &roster[(*rotation + offset) % roster.len()];
        if load.can_take(candidate.id, apt) {
            *rotation = (*rotation + offset + 1) % roster.len();
            return Some(candidate.id);
        }
    }
    None
}

fn pick_by_skill(
    roster: &[StaffMember],
    load: &StaffLoad,
    apt: &Appointment,
    categories: &HashMap<Uuid, String>,
) -> Option<Uuid> {
    let category = categories.get(&apt.service_id).map(String::as_str).unwrap_or("");

    let matching = roster
        .iter()
        .find(|staff| staff.matches_category(category) && load.can_take(staff.id, apt));
    if let Some(staff) = matching {
        return Some(staff.id);
    }

    // No specialist free: fall back to the first generalist, then to anyone.
    let generalist = roster
        .iter()
        .find(|staff| staff.is_generalist() && load.can_take(staff.id, apt));
    if let Some(staff) = generalist {
        return Some(staff.id);
    }

    roster
        .iter()
        .find(|staff| load.can_take(staff.id, apt))
        .map(|staff| staff.id)
}

fn pick_least_loaded(roster: &[StaffMember], load: &StaffLoad, apt: &Appointment) -> Option<Uuid> {
    roster
        .iter()
        .filter(|staff| load.can_take(staff.id, apt))
        .min_by_key(|staff| load.count(staff.id))
        .map(|staff| staff.id)
}

fn pick_random(roster: &[StaffMember], load: &StaffLoad, apt: &Appointment) -> Option<Uuid> {
    let available: Vec<&StaffMember> = roster
        .iter()
        .filter(|staff| load.can_take(staff.id, apt))
        .collect();
    available
        .choose(&mut rand::thread_rng())
        .map(|staff| staff.id)
}

/// Staff Assignment Engine: assigns every unassigned Scheduled/Confirmed
/// appointment of a provider under the chosen strategy. Runs for one
/// provider serialize on an advisory lock so two sweeps cannot hand out the
/// same appointment twice.
pub struct StaffAssignmentService {
    store: Arc<StoreClient>,
    staff_service: StaffService,
    lock_service: SlotLockService,
}

impl StaffAssignmentService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        Self {
            staff_service: StaffService::with_store(Arc::clone(&store)),
            lock_service: SlotLockService::new(Arc::clone(&store)),
            store,
        }
    }

    /// `assignStaff(providerId, strategy)`.
    #[instrument(skip(self, auth_token))]
    pub async fn assign_staff(
        &self,
        provider_id: Uuid,
        strategy: AssignmentStrategy,
        auth_token: &str,
    ) -> Result<AssignmentOutcome, BookingError> {
        info!("Assigning staff for provider {} with {} strategy", provider_id, strategy);

        let roster = self
            .staff_service
            .get_active_staff(provider_id, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if roster.is_empty() {
            return Err(BookingError::NoActiveStaff);
        }

        let lock_key = SlotLockService::assignment_lock_key(provider_id);
        if !self.lock_service.acquire(&lock_key, provider_id).await? {
            warn!("Assignment already running for provider {}", provider_id);
            return Err(BookingError::SlotConflict);
        }

        let result = self
            .assign_under_lock(provider_id, strategy, &roster, auth_token)
            .await;

        self.lock_service.release(&lock_key).await?;
        result
    }

    async fn assign_under_lock(
        &self,
        provider_id: Uuid,
        strategy: AssignmentStrategy,
        roster: &[StaffMember],
        auth_token: &str,
    ) -> Result<AssignmentOutcome, BookingError> {
        let unassigned = self
            .fetch_appointments(provider_id, true, auth_token)
            .await?;
        let already_assigned = self
            .fetch_appointments(provider_id, false, auth_token)
            .await?;
        let categories = self.fetch_service_categories(provider_id, auth_token).await?;

        debug!(
            "Provider {}: {} unassigned appointments, {} staff members",
            provider_id,
            unassigned.len(),
            roster.len()
        );

        let assignments =
            compute_assignments(strategy, &unassigned, roster, &already_assigned, &categories);

        for assignment in &assignments {
            let update_data = json!({
                "staff_id": assignment.staff_id,
                "updated_at": chrono::Utc::now().to_rfc3339()
            });
            let path = format!("/rest/v1/appointments?id=eq.{}", assignment.appointment_id);
            let _: Vec<Value> = self
                .store
                .request(Method::PATCH, &path, Some(auth_token), Some(update_data))
                .await
                .map_err(|e| BookingError::DatabaseError(e.to_string()))?;
        }

        info!(
            "Assigned {} of {} appointments for provider {}",
            assignments.len(),
            unassigned.len(),
            provider_id
        );

        Ok(AssignmentOutcome {
            assigned_count: assignments.len(),
            assignments,
        })
    }

    async fn fetch_appointments(
        &self,
        provider_id: Uuid,
        unassigned_only: bool,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let staff_filter = if unassigned_only {
            "staff_id=is.null"
        } else {
            "staff_id=not.is.null"
        };
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=in.(scheduled,confirmed)&{}&order=scheduled_start_time.asc",
            provider_id, staff_filter
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

    async fn fetch_service_categories(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<HashMap<Uuid, String>, BookingError> {
        let path = format!("/rest/v1/service_offerings?provider_id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let mut categories = HashMap::new();
        for row in result {
            if let (Some(id), Some(category)) = (
                row["id"].as_str().and_then(|s| Uuid::parse_str(s).ok()),
                row["category"].as_str(),
            ) {
                categories.insert(id, category.to_string());
            }
        }
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, PaymentStatus};
    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    fn staff(name: &str, specialties: &[&str]) -> StaffMember {
        let now = Utc::now();
        StaffMember {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            name: name.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn appointment_at(hour: u32, service_id: Uuid) -> Appointment {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let start = date
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .and_utc();
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_id,
            customer_id: Uuid::new_v4(),
            staff_id: None,
            scheduled_start_time: start,
            scheduled_end_time: start + chrono::Duration::minutes(60),
            duration_minutes: 60,
            price: Decimal::from_str_exact("45.00").unwrap(),
            status: AppointmentStatus::Scheduled,
            payment_status: PaymentStatus::Authorized,
            payment_ref: None,
            idempotency_key: Uuid::new_v4().to_string(),
            cancellation_reason: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn count_per_staff(assignments: &[StaffAssignment]) -> HashMap<Uuid, usize> {
        let mut counts = HashMap::new();
        for a in assignments {
            *counts.entry(a.staff_id).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn balanced_spreads_evenly() {
        let roster = vec![staff("Ana", &[]), staff("Bea", &[]), staff("Cy", &[])];
        let service = Uuid::new_v4();
        // Non-overlapping hours so exclusivity never interferes.
        let unassigned: Vec<_> = (9..16).map(|h| appointment_at(h, service)).collect();

        let assignments =
            compute_assignments(AssignmentStrategy::Balanced, &unassigned, &roster, &[], &HashMap::new());

        assert_eq!(assignments.len(), 7);
        let counts = count_per_staff(&assignments);
        // 7 appointments over 3 staff: everyone gets floor(7/3) or ceil(7/3).
        for staff in &roster {
            let count = counts.get(&staff.id).copied().unwrap_or(0);
            assert!(count == 2 || count == 3, "staff got {} assignments", count);
        }
    }

    #[test]
    fn balanced_is_deterministic() {
        let roster = vec![staff("Ana", &[]), staff("Bea", &[])];
        let service = Uuid::new_v4();
        let unassigned: Vec<_> = (9..14).map(|h| appointment_at(h, service)).collect();

        let first =
            compute_assignments(AssignmentStrategy::Balanced, &unassigned, &roster, &[], &HashMap::new());
        let second =
            compute_assignments(AssignmentStrategy::Balanced, &unassigned, &roster, &[], &HashMap::new());
        assert_eq!(first, second);
    }

    #[test]
    fn skill_based_prefers_matching_specialty() {
        let colorist = staff("Ana", &["color"]);
        let generalist = staff("Bea", &[]);
        let roster = vec![colorist.clone(), generalist.clone()];

        let color_service = Uuid::new_v4();
        let nails_service = Uuid::new_v4();
        let mut categories = HashMap::new();
        categories.insert(color_service, "color".to_string());
        categories.insert(nails_service, "nails".to_string());

        let unassigned = vec![appointment_at(9, color_service), appointment_at(11, nails_service)];

        let assignments = compute_assignments(
            AssignmentStrategy::SkillBased,
            &unassigned,
            &roster,
            &[],
            &categories,
        );

        assert_eq!(assignments[0].staff_id, colorist.id);
        // No nail specialist on the roster: falls back to the generalist.
        assert_eq!(assignments[1].staff_id, generalist.id);
    }

    #[test]
    fn workload_priority_seeds_from_existing_assignments() {
        let busy = staff("Ana", &[]);
        let idle = staff("Bea", &[]);
        let roster = vec![busy.clone(), idle.clone()];
        let service = Uuid::new_v4();

        let mut existing = appointment_at(9, service);
        existing.staff_id = Some(busy.id);

        let unassigned = vec![appointment_at(11, service)];

        let assignments = compute_assignments(
            AssignmentStrategy::WorkloadPriority,
            &unassigned,
            &roster,
            &[existing],
            &HashMap::new(),
        );

        assert_eq!(assignments[0].staff_id, idle.id);
    }

    #[test]
    fn staff_member_never_double_booked() {
        let only = staff("Ana", &[]);
        let roster = vec![only.clone()];
        let service = Uuid::new_v4();

        // Two appointments in the same hour; one person cannot take both.
        let unassigned = vec![appointment_at(9, service), appointment_at(9, service)];

        for strategy in [
            AssignmentStrategy::Balanced,
            AssignmentStrategy::SkillBased,
            AssignmentStrategy::WorkloadPriority,
            AssignmentStrategy::Random,
        ] {
            let assignments =
                compute_assignments(strategy, &unassigned, &roster, &[], &HashMap::new());
            assert_eq!(assignments.len(), 1, "{} double-booked a staff member", strategy);
        }
    }

    #[test]
    fn random_only_picks_roster_members() {
        let roster = vec![staff("Ana", &[]), staff("Bea", &[])];
        let service = Uuid::new_v4();
        let unassigned: Vec<_> = (9..13).map(|h| appointment_at(h, service)).collect();

        let assignments =
            compute_assignments(AssignmentStrategy::Random, &unassigned, &roster, &[], &HashMap::new());

        assert_eq!(assignments.len(), 4);
        let roster_ids: Vec<Uuid> = roster.iter().map(|s| s.id).collect();
        assert!(assignments.iter().all(|a| roster_ids.contains(&a.staff_id)));
    }

    #[test]
    fn empty_roster_assigns_nothing() {
        let service = Uuid::new_v4();
        let unassigned = vec![appointment_at(9, service)];
        let assignments =
            compute_assignments(AssignmentStrategy::Balanced, &unassigned, &[], &[], &HashMap::new());
        assert!(assignments.is_empty());
    }
}
