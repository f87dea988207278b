use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{NotificationError, NotificationEvent};
use crate::services::dispatch::DispatchService;

const REMINDER_WINDOW_HOURS: i64 = 24;
const RETRY_BATCH_SIZE: i32 = 50;

/// Periodic sweep: re-attempts due Pending/Failed outbox entries and emits
/// ReminderDue events for appointments entering the reminder window. Runs on
/// a fixed interval, independent of request handling.
pub struct NotificationSweepService {
    store: Arc<StoreClient>,
    dispatch_service: Arc<DispatchService>,
    interval_seconds: u64,
    is_shutdown: RwLock<bool>,
}

impl NotificationSweepService {
    pub fn new(config: &AppConfig, interval_seconds: u64) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
            dispatch_service: Arc::new(DispatchService::new(config)),
            interval_seconds,
            is_shutdown: RwLock::new(false),
        }
    }

    pub async fn start(self: Arc<Self>) {
        info!("Notification sweep started ({}s interval)", self.interval_seconds);

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.interval_seconds));

        loop {
            ticker.tick().await;

            if *self.is_shutdown.read().await {
                info!("Notification sweep shutting down");
                break;
            }

            if let Err(e) = self.sweep_once().await {
                error!("Notification sweep pass failed: {}", e);
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    /// One sweep pass; also callable from the admin endpoint.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<SweepSummary, NotificationError> {
        let retried = self.retry_due_notifications().await?;
        let reminders = self.emit_due_reminders().await?;

        if retried > 0 || reminders > 0 {
            info!("Sweep pass: {} retries, {} reminders queued", retried, reminders);
        } else {
            debug!("Sweep pass: nothing due");
        }

        Ok(SweepSummary { retried, reminders })
    }

    async fn retry_due_notifications(&self) -> Result<u32, NotificationError> {
        let due = self.dispatch_service.list_due(RETRY_BATCH_SIZE).await?;
        let count = due.len() as u32;

        for record in &due {
            if !record.can_retry() {
                continue;
            }
            self.dispatch_service.attempt_delivery(record).await;
        }

        Ok(count)
    }

    /// Queue one reminder per Scheduled/Confirmed appointment whose start
    /// falls inside the reminder window.
    async fn emit_due_reminders(&self) -> Result<u32, NotificationError> {
        let now = Utc::now();
        let window_end = now + Duration::hours(REMINDER_WINDOW_HOURS);

        let path = format!(
            "/rest/v1/appointments?status=in.(scheduled,confirmed)&scheduled_start_time=gte.{}&scheduled_start_time=lte.{}&order=scheduled_start_time.asc",
            urlencoding::encode(&now.to_rfc3339()),
            urlencoding::encode(&window_end.to_rfc3339()),
        );

        let appointments: Vec<Value> = self
            .store
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let mut queued = 0;

        for apt in appointments {
            let Some(appointment_id) = parse_uuid(&apt["id"]) else { continue };
            let Some(provider_id) = parse_uuid(&apt["provider_id"]) else { continue };
            let Some(customer_id) = parse_uuid(&apt["customer_id"]) else { continue };
            let Some(start_time) = apt["scheduled_start_time"]
                .as_str()
                .and_then(|s| s.parse().ok())
            else {
                continue;
            };

            if self.dispatch_service.reminder_exists(appointment_id).await? {
                continue;
            }

            let provider_name = self.provider_name(provider_id).await.unwrap_or_default();

            let event = NotificationEvent::ReminderDue {
                appointment_id,
                provider_id,
                customer_id,
                provider_name,
                start_time,
            };

            match self.dispatch_service.dispatch_system(event).await {
                Ok(()) => queued += 1,
                Err(NotificationError::NoContactDetails) => {
                    debug!("No contact details for customer {}; reminder skipped", customer_id);
                }
                Err(e) => warn!("Reminder dispatch for {} failed: {}", appointment_id, e),
            }
        }

        Ok(queued)
    }

    async fn provider_name(&self, provider_id: Uuid) -> Option<String> {
        let path = format!("/rest/v1/providers?id=eq.{}&select=name", provider_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, None, None)
            .await
            .ok()?;
        result.first()?["name"].as_str().map(str::to_string)
    }
}

fn parse_uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SweepSummary {
    pub retried: u32,
    pub reminders: u32,
}
