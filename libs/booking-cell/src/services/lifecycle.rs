use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentStatus, BookingError};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition {} -> {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(BookingError::InvalidStateTransition(*current_status));
        }

        Ok(())
    }

    /// All valid next statuses for a given current status.
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }

    /// A confirmed appointment whose start passed this long ago without a
    /// completion is eligible for no-show.
    pub fn should_mark_no_show(
        &self,
        current_status: &AppointmentStatus,
        scheduled_start_time: DateTime<Utc>,
        current_time: DateTime<Utc>,
    ) -> bool {
        if *current_status != AppointmentStatus::Confirmed {
            return false;
        }

        let no_show_threshold = scheduled_start_time + Duration::minutes(30);
        current_time > no_show_threshold
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_can_confirm_or_cancel() {
        let service = AppointmentLifecycleService::new();
        assert!(service
            .validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::Confirmed)
            .is_ok());
        assert!(service
            .validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::Cancelled)
            .is_ok());
        assert!(service
            .validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::Completed)
            .is_err());
    }

    #[test]
    fn confirmed_can_complete_cancel_or_no_show() {
        let service = AppointmentLifecycleService::new();
        for target in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(service
                .validate_status_transition(&AppointmentStatus::Confirmed, &target)
                .is_ok());
        }
        assert!(service
            .validate_status_transition(&AppointmentStatus::Confirmed, &AppointmentStatus::Scheduled)
            .is_err());
    }

    #[test]
    fn terminal_states_allow_nothing() {
        let service = AppointmentLifecycleService::new();
        for terminal in [
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert!(service.get_valid_transitions(&terminal).is_empty());
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn no_show_only_after_grace_period() {
        let service = AppointmentLifecycleService::new();
        let start = Utc::now();

        assert!(!service.should_mark_no_show(&AppointmentStatus::Confirmed, start, start + Duration::minutes(20)));
        assert!(service.should_mark_no_show(&AppointmentStatus::Confirmed, start, start + Duration::minutes(31)));
        assert!(!service.should_mark_no_show(&AppointmentStatus::Scheduled, start, start + Duration::minutes(31)));
    }
}
