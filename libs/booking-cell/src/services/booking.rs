use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::models::NotificationEvent;
use notification_cell::services::DispatchService;
use provider_cell::models::{Provider, ServiceOffering};
use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStats, AppointmentStatus,
    BookAppointmentRequest, BookingError, BookingRules, PaymentStatus,
    RescheduleAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockService;
use crate::services::payment::PaymentClient;
use crate::services::slots::{weekday_index, SlotService};

/// Booking Transaction Manager. The commit path here is the single source of
/// truth for slot exclusivity: claim the provider-day lock, re-check
/// conflicts against the live set, insert, then authorize payment. Exactly
/// one of N concurrent conflicting attempts can get past the lock + re-check.
pub struct BookingService {
    store: Arc<StoreClient>,
    slot_service: SlotService,
    conflict_service: ConflictDetectionService,
    lock_service: SlotLockService,
    lifecycle_service: AppointmentLifecycleService,
    payment_client: PaymentClient,
    dispatch_service: DispatchService,
    rules: BookingRules,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let store = Arc::new(StoreClient::new(config));
        Self {
            slot_service: SlotService::new(config),
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lock_service: SlotLockService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            payment_client: PaymentClient::new(config),
            dispatch_service: DispatchService::new(config),
            store,
            rules: BookingRules::default(),
        }
    }

    /// `bookAppointment(providerId, serviceId, customerId, date, startTime)`.
    /// Bounded by the operation timeout; on expiry the caller gets a
    /// retryable error and the abandoned slot lock ages out on its own.
    #[instrument(skip(self, auth_token), fields(provider_id = %request.provider_id))]
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let timeout = Duration::from_secs(self.rules.operation_timeout_seconds);
        match tokio::time::timeout(timeout, self.book_appointment_inner(request, auth_token)).await
        {
            Ok(result) => result,
            Err(_) => Err(BookingError::Timeout),
        }
    }

    async fn book_appointment_inner(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        info!(
            "Booking appointment for customer {} with provider {}",
            request.customer_id, request.provider_id
        );

        self.validate_idempotency_key(&request.idempotency_key)?;

        // Retried attempts return the already-committed appointment.
        if let Some(existing) = self
            .find_by_idempotency_key(request.customer_id, &request.idempotency_key, auth_token)
            .await?
        {
            info!(
                "Idempotent replay of booking {} (key {})",
                existing.id, request.idempotency_key
            );
            return Ok(existing);
        }

        let provider = self
            .slot_service
            .get_provider(request.provider_id, auth_token)
            .await?;
        let service = self
            .slot_service
            .get_active_service(&provider, request.service_id, auth_token)
            .await?;

        let start_time = request.date.and_time(request.start_time).and_utc();
        let end_time = start_time + ChronoDuration::minutes(service.duration_minutes as i64);

        self.validate_booking_windows(&provider, start_time)?;
        self.validate_within_working_hours(&provider, &request, &service, auth_token)
            .await?;

        // Claim the provider-day; everything between here and release is the
        // serialized commit section.
        let lock_key = SlotLockService::slot_lock_key(provider.id, request.date);
        if !self.lock_service.acquire(&lock_key, provider.id).await? {
            warn!("Slot lock contention for provider {} on {}", provider.id, request.date);
            return Err(BookingError::SlotConflict);
        }

        let committed = self
            .commit_under_lock(&provider, &service, &request, start_time, end_time, auth_token)
            .await;

        self.lock_service.release(&lock_key).await?;

        let appointment = committed?;

        // Booking success and notification success are independent outcomes;
        // a dead notifier never unwinds a committed appointment.
        let event = NotificationEvent::BookingCreated {
            appointment_id: appointment.id,
            provider_id: provider.id,
            customer_id: appointment.customer_id,
            provider_name: provider.name.clone(),
            service_name: service.name.clone(),
            start_time: appointment.scheduled_start_time,
        };
        if let Err(e) = self.dispatch_service.dispatch(event, auth_token).await {
            warn!("Booking {} created but notification dispatch failed: {}", appointment.id, e);
        }

        info!("Appointment {} booked for provider {}", appointment.id, provider.id);
        Ok(appointment)
    }

    async fn commit_under_lock(
        &self,
        provider: &Provider,
        service: &ServiceOffering,
        request: &BookAppointmentRequest,
        start_time: chrono::DateTime<Utc>,
        end_time: chrono::DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let conflicts = self
            .conflict_service
            .check_conflicts(
                provider.id,
                start_time,
                end_time,
                provider.buffer_minutes,
                None,
                auth_token,
            )
            .await?;

        if !conflicts.is_empty() {
            return Err(BookingError::SlotConflict);
        }

        let appointment = self
            .create_appointment_record(provider, service, request, start_time, end_time, auth_token)
            .await?;

        // No appointment may exist without a successful authorization; a
        // dead payment processor rolls the tentative row back.
        match self
            .payment_client
            .authorize(request.customer_id, appointment.id, service.price, &request.idempotency_key)
            .await
        {
            Ok(payment_ref) => {
                self.record_payment_authorized(appointment.id, &payment_ref, auth_token)
                    .await
            }
            Err(e) => {
                warn!("Payment authorization failed, rolling back appointment {}", appointment.id);
                self.delete_appointment_record(appointment.id, auth_token).await?;
                Err(e)
            }
        }
    }

    /// Reschedule to a new start, re-running the same policy and conflict
    /// machinery that booking uses.
    #[instrument(skip(self, auth_token))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Rescheduling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if current.status.is_terminal() {
            return Err(BookingError::InvalidStateTransition(current.status));
        }

        let provider = self
            .slot_service
            .get_provider(current.provider_id, auth_token)
            .await?;

        let new_start = request.new_date.and_time(request.new_start_time).and_utc();
        let new_end = new_start + ChronoDuration::minutes(current.duration_minutes as i64);

        self.validate_booking_windows(&provider, new_start)?;

        let lock_key = SlotLockService::slot_lock_key(provider.id, request.new_date);
        if !self.lock_service.acquire(&lock_key, provider.id).await? {
            return Err(BookingError::SlotConflict);
        }

        let result = async {
            let conflicts = self
                .conflict_service
                .check_conflicts(
                    provider.id,
                    new_start,
                    new_end,
                    provider.buffer_minutes,
                    Some(appointment_id),
                    auth_token,
                )
                .await?;

            if !conflicts.is_empty() {
                return Err(BookingError::SlotConflict);
            }

            let update_data = json!({
                "scheduled_start_time": new_start.to_rfc3339(),
                "scheduled_end_time": new_end.to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339()
            });
            self.patch_appointment(appointment_id, update_data, auth_token).await
        }
        .await;

        self.lock_service.release(&lock_key).await?;
        let updated = result?;

        let event = NotificationEvent::BookingRescheduled {
            appointment_id: updated.id,
            provider_id: provider.id,
            customer_id: updated.customer_id,
            provider_name: provider.name.clone(),
            old_start_time: current.scheduled_start_time,
            new_start_time: updated.scheduled_start_time,
        };
        if let Err(e) = self.dispatch_service.dispatch(event, auth_token).await {
            warn!("Reschedule of {} committed but notification dispatch failed: {}", updated.id, e);
        }

        info!("Appointment {} rescheduled to {}", appointment_id, new_start);
        Ok(updated)
    }

    /// Scheduled -> Confirmed.
    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.transition_appointment(appointment_id, AppointmentStatus::Confirmed, auth_token)
            .await
    }

    /// Confirmed -> Completed.
    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.transition_appointment(appointment_id, AppointmentStatus::Completed, auth_token)
            .await
    }

    /// Confirmed -> NoShow.
    pub async fn mark_no_show(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        self.transition_appointment(appointment_id, AppointmentStatus::NoShow, auth_token)
            .await
    }

    async fn transition_appointment(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle_service
            .validate_status_transition(&current.status, &new_status)?;

        let update_data = json!({
            "status": new_status.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });
        self.patch_appointment(appointment_id, update_data, auth_token).await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Search appointments with filters.
    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(customer_id) = query.customer_id {
            query_parts.push(format!("customer_id=eq.{}", customer_id));
        }
        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(staff_id) = query.staff_id {
            query_parts.push(format!("staff_id=eq.{}", staff_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            let encoded = urlencoding::encode(&from_date.to_rfc3339()).into_owned();
            query_parts.push(format!("scheduled_start_time=gte.{}", encoded));
        }
        if let Some(to_date) = query.to_date {
            let encoded = urlencoding::encode(&to_date.to_rfc3339()).into_owned();
            query_parts.push(format!("scheduled_start_time=lte.{}", encoded));
        }

        let mut path = format!(
            "/rest/v1/appointments?{}&order=scheduled_start_time.desc",
            query_parts.join("&")
        );

        if let Some(limit) = query.limit {
            path.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

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

    /// Upcoming slot-holding appointments within the window.
    pub async fn get_upcoming_appointments(
        &self,
        customer_id: Option<Uuid>,
        provider_id: Option<Uuid>,
        hours_ahead: Option<i32>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let now = Utc::now();
        let future_time = now + ChronoDuration::hours(hours_ahead.unwrap_or(24) as i64);

        let query = AppointmentSearchQuery {
            customer_id,
            provider_id,
            staff_id: None,
            status: None,
            from_date: Some(now),
            to_date: Some(future_time),
            limit: Some(50),
            offset: None,
        };

        let mut appointments = self.search_appointments(query, auth_token).await?;
        appointments.retain(Appointment::holds_slot);

        Ok(appointments)
    }

    /// Derived per-provider statistics; computed from the appointment set on
    /// every call, never stored.
    pub async fn get_appointment_stats(
        &self,
        provider_id: Uuid,
        from_date: Option<chrono::DateTime<Utc>>,
        to_date: Option<chrono::DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<AppointmentStats, BookingError> {
        let query = AppointmentSearchQuery {
            customer_id: None,
            provider_id: Some(provider_id),
            staff_id: None,
            status: None,
            from_date,
            to_date,
            limit: None,
            offset: None,
        };

        let appointments = self.search_appointments(query, auth_token).await?;

        let total_appointments = appointments.len() as i32;
        let completed: Vec<_> = appointments
            .iter()
            .filter(|apt| apt.status == AppointmentStatus::Completed)
            .collect();
        let cancelled_appointments = appointments
            .iter()
            .filter(|apt| apt.status == AppointmentStatus::Cancelled)
            .count() as i32;
        let no_show_appointments = appointments
            .iter()
            .filter(|apt| apt.status == AppointmentStatus::NoShow)
            .count() as i32;

        let completed_revenue = completed.iter().map(|apt| apt.price).sum();

        let cancellation_rate = if total_appointments > 0 {
            cancelled_appointments as f64 / total_appointments as f64
        } else {
            0.0
        };

        Ok(AppointmentStats {
            total_appointments,
            completed_appointments: completed.len() as i32,
            cancelled_appointments,
            no_show_appointments,
            completed_revenue,
            cancellation_rate,
        })
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_idempotency_key(&self, key: &str) -> Result<(), BookingError> {
        if key.trim().is_empty() {
            return Err(BookingError::InvalidInput(
                "An idempotency key is required for booking".to_string(),
            ));
        }
        if key.len() > self.rules.max_idempotency_key_length {
            return Err(BookingError::InvalidInput(format!(
                "Idempotency key cannot exceed {} characters",
                self.rules.max_idempotency_key_length
            )));
        }
        Ok(())
    }

    /// Notice and advance windows, evaluated at commit time rather than at
    /// the earlier availability read.
    fn validate_booking_windows(
        &self,
        provider: &Provider,
        start_time: chrono::DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let now = Utc::now();

        let notice_cutoff = now + ChronoDuration::minutes(provider.min_notice_minutes.max(0) as i64);
        if start_time < notice_cutoff {
            return Err(BookingError::PolicyViolation(format!(
                "Appointments require at least {} minutes notice",
                provider.min_notice_minutes
            )));
        }

        let advance_cutoff = now + ChronoDuration::days(provider.max_advance_days.max(0) as i64);
        if start_time > advance_cutoff {
            return Err(BookingError::PolicyViolation(format!(
                "Appointments cannot be booked more than {} days in advance",
                provider.max_advance_days
            )));
        }

        Ok(())
    }

    async fn validate_within_working_hours(
        &self,
        provider: &Provider,
        request: &BookAppointmentRequest,
        service: &ServiceOffering,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let hours = self
            .provider_working_hours(provider.id, request.date, auth_token)
            .await?;

        let Some(hours) = hours else {
            return Err(BookingError::PolicyViolation(
                "Provider is closed on the requested day".to_string(),
            ));
        };

        if hours.is_closed {
            return Err(BookingError::PolicyViolation(
                "Provider is closed on the requested day".to_string(),
            ));
        }

        let end = request
            .start_time
            .overflowing_add_signed(ChronoDuration::minutes(service.duration_minutes as i64));
        if request.start_time < hours.open_time || end.1 != 0 || end.0 > hours.close_time {
            return Err(BookingError::PolicyViolation(
                "Requested time falls outside working hours".to_string(),
            ));
        }

        Ok(())
    }

    async fn provider_working_hours(
        &self,
        provider_id: Uuid,
        date: chrono::NaiveDate,
        auth_token: &str,
    ) -> Result<Option<provider_cell::models::WorkingHours>, BookingError> {
        let path = format!(
            "/rest/v1/working_hours?provider_id=eq.{}&weekday=eq.{}",
            provider_id,
            weekday_index(date)
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| BookingError::DatabaseError(format!("Failed to parse working hours: {}", e))),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(
        &self,
        customer_id: Uuid,
        idempotency_key: &str,
        auth_token: &str,
    ) -> Result<Option<Appointment>, BookingError> {
        let path = format!(
            "/rest/v1/appointments?customer_id=eq.{}&idempotency_key=eq.{}",
            customer_id,
            urlencoding::encode(idempotency_key)
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e))),
            None => Ok(None),
        }
    }

    async fn create_appointment_record(
        &self,
        provider: &Provider,
        service: &ServiceOffering,
        request: &BookAppointmentRequest,
        start_time: chrono::DateTime<Utc>,
        end_time: chrono::DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let now = Utc::now();

        let appointment_data = json!({
            "provider_id": provider.id,
            "service_id": service.id,
            "customer_id": request.customer_id,
            "staff_id": null,
            "scheduled_start_time": start_time.to_rfc3339(),
            "scheduled_end_time": end_time.to_rfc3339(),
            "duration_minutes": service.duration_minutes,
            "price": service.price,
            "status": AppointmentStatus::Scheduled.to_string(),
            "payment_status": PaymentStatus::Pending.to_string(),
            "idempotency_key": request.idempotency_key,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::DatabaseError("Failed to create appointment".to_string()));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse created appointment: {}", e)))
    }

    async fn record_payment_authorized(
        &self,
        appointment_id: Uuid,
        payment_ref: &str,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let update_data = json!({
            "payment_status": PaymentStatus::Authorized.to_string(),
            "payment_ref": payment_ref,
            "updated_at": Utc::now().to_rfc3339()
        });
        self.patch_appointment(appointment_id, update_data, auth_token).await
    }

    async fn delete_appointment_record(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub(crate) async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(BookingError::NotFound);
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse updated appointment: {}", e)))
    }
}
