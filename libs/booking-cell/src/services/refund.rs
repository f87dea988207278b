use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use notification_cell::models::NotificationEvent;
use notification_cell::services::DispatchService;
use provider_cell::models::RefundTier;
use provider_cell::services::{PolicyService, ProviderService};
use shared_config::AppConfig;

use crate::models::{
    Appointment, AppointmentStatus, BookingError, BookingRules, CancelAppointmentRequest,
    CancellationOutcome, PaymentStatus,
};
use crate::services::booking::BookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::payment::PaymentClient;

/// Refund percentage for a cancellation this many minutes ahead of the
/// appointment. Tiers must arrive sorted descending by threshold; the first
/// tier whose threshold is met wins, inclusive at the boundary. A start
/// already in the past earns nothing.
pub fn select_refund_percentage(sorted_tiers: &[RefundTier], minutes_until: i64) -> u32 {
    let minutes_until = minutes_until.max(0);
    for tier in sorted_tiers {
        if minutes_until >= tier.hours_before * 60 {
            return tier.refund_percentage;
        }
    }
    0
}

/// Exact refund arithmetic, rounded to cents.
pub fn compute_refund_amount(price: Decimal, refund_percentage: u32) -> Decimal {
    (price * Decimal::from(refund_percentage) / Decimal::from(100)).round_dp(2)
}

/// Cancellation / Refund Policy Engine.
pub struct CancellationService {
    booking_service: BookingService,
    policy_service: PolicyService,
    provider_service: ProviderService,
    lifecycle_service: AppointmentLifecycleService,
    payment_client: PaymentClient,
    dispatch_service: DispatchService,
    rules: BookingRules,
}

impl CancellationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            booking_service: BookingService::new(config),
            policy_service: PolicyService::new(config),
            provider_service: ProviderService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(),
            payment_client: PaymentClient::new(config),
            dispatch_service: DispatchService::new(config),
            rules: BookingRules::default(),
        }
    }

    /// `cancelAppointment(appointmentId, actorId, reason?)`. Deterministic:
    /// the same policy and the same time-to-appointment always produce the
    /// same refund percentage.
    #[instrument(skip(self, auth_token))]
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<CancellationOutcome, BookingError> {
        let timeout = Duration::from_secs(self.rules.operation_timeout_seconds);
        match tokio::time::timeout(
            timeout,
            self.cancel_appointment_inner(appointment_id, request, auth_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BookingError::Timeout),
        }
    }

    async fn cancel_appointment_inner(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<CancellationOutcome, BookingError> {
        let appointment = self
            .booking_service
            .get_appointment(appointment_id, auth_token)
            .await?;

        // Cancelling a terminal appointment is rejected before any side
        // effect; payment state stays untouched.
        self.lifecycle_service
            .validate_status_transition(&appointment.status, &AppointmentStatus::Cancelled)?;

        let policy = self
            .policy_service
            .get_policy(appointment.provider_id, auth_token)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let outcome = self.evaluate_refund(&appointment, &policy.sorted_tiers(), Utc::now());

        let payment_status = match outcome.refund_percentage {
            100 => PaymentStatus::Refunded,
            0 => appointment.payment_status,
            _ => PaymentStatus::PartiallyRefunded,
        };

        let cancellation_note = request.reason.clone();
        let update_data = json!({
            "status": AppointmentStatus::Cancelled.to_string(),
            "cancellation_reason": cancellation_note,
            "cancelled_by": request.cancelled_by,
            "payment_status": payment_status.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let cancelled = self
            .booking_service
            .patch_appointment(appointment_id, update_data, auth_token)
            .await?;

        if outcome.refund_percentage > 0 {
            match &appointment.payment_ref {
                Some(payment_ref) => {
                    self.payment_client
                        .refund(payment_ref, outcome.refund_amount)
                        .await?;
                }
                None => {
                    warn!(
                        "Appointment {} cancelled with {}% refund due but no payment reference",
                        appointment_id, outcome.refund_percentage
                    );
                }
            }
        }

        let provider_name = self
            .provider_service
            .get_provider(appointment.provider_id, auth_token)
            .await
            .map(|p| p.name)
            .unwrap_or_default();

        let event = NotificationEvent::BookingCancelled {
            appointment_id: cancelled.id,
            provider_id: cancelled.provider_id,
            customer_id: cancelled.customer_id,
            provider_name,
            start_time: cancelled.scheduled_start_time,
            refund_percentage: outcome.refund_percentage,
            refund_amount: outcome.refund_amount,
        };
        if let Err(e) = self.dispatch_service.dispatch(event, auth_token).await {
            warn!("Cancellation of {} committed but notification dispatch failed: {}", appointment_id, e);
        }

        info!(
            "Appointment {} cancelled by {:?} ({}% refund, {})",
            appointment_id, request.cancelled_by, outcome.refund_percentage, outcome.refund_amount
        );
        Ok(outcome)
    }

    fn evaluate_refund(
        &self,
        appointment: &Appointment,
        sorted_tiers: &[RefundTier],
        now: DateTime<Utc>,
    ) -> CancellationOutcome {
        let minutes_until = (appointment.scheduled_start_time - now).num_minutes();
        let refund_percentage = select_refund_percentage(sorted_tiers, minutes_until);
        let refund_amount = compute_refund_amount(appointment.price, refund_percentage);

        CancellationOutcome {
            appointment_id: appointment.id,
            refund_percentage,
            refund_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_cell::models::CancellationPolicy;

    fn default_sorted() -> Vec<RefundTier> {
        let mut tiers = CancellationPolicy::default_tiers();
        tiers.sort_by(|a, b| b.hours_before.cmp(&a.hours_before));
        tiers
    }

    #[test]
    fn full_refund_at_exactly_threshold() {
        // Inclusive boundary: exactly 24 hours out still earns 100%.
        assert_eq!(select_refund_percentage(&default_sorted(), 24 * 60), 100);
    }

    #[test]
    fn half_refund_one_minute_inside_threshold() {
        assert_eq!(select_refund_percentage(&default_sorted(), 24 * 60 - 1), 50);
    }

    #[test]
    fn nothing_inside_two_hours() {
        assert_eq!(select_refund_percentage(&default_sorted(), 60), 0);
        assert_eq!(select_refund_percentage(&default_sorted(), 2 * 60), 50);
        assert_eq!(select_refund_percentage(&default_sorted(), 2 * 60 - 1), 0);
    }

    #[test]
    fn past_appointments_earn_nothing() {
        assert_eq!(select_refund_percentage(&default_sorted(), -30), 0);
    }

    #[test]
    fn selection_is_deterministic() {
        let tiers = default_sorted();
        for minutes in [0, 1, 119, 120, 1439, 1440, 5000] {
            let first = select_refund_percentage(&tiers, minutes);
            let second = select_refund_percentage(&tiers, minutes);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn refund_amount_rounds_to_cents() {
        let price = Decimal::from_str_exact("45.99").unwrap();
        assert_eq!(compute_refund_amount(price, 100), price);
        assert_eq!(
            compute_refund_amount(price, 50),
            Decimal::from_str_exact("23.00").unwrap()
        );
        assert_eq!(compute_refund_amount(price, 0), Decimal::ZERO);
    }

    #[test]
    fn unmatched_policy_defaults_to_zero() {
        let tiers = vec![RefundTier { hours_before: 48, refund_percentage: 100 }];
        assert_eq!(select_refund_percentage(&tiers, 24 * 60), 0);
    }
}
