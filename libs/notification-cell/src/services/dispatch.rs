use chrono::{Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{
    Channel, CustomerContact, Locale, NotificationError, NotificationEvent, NotificationRecord,
    NotificationStatus, RenderedMessage,
};
use crate::services::email::EmailClient;
use crate::services::sms::SmsClient;
use crate::services::templates::{render_email, render_sms};

const MAX_ATTEMPTS: i32 = 5;
const RETRY_BACKOFF_MINUTES: i64 = 5;

/// Notification Dispatch Gate. Maps domain events to channel payloads,
/// records every outbound message in the outbox, and attempts immediate
/// delivery. Callers treat dispatch as fire-and-forget: a failed delivery is
/// recorded for the sweep to retry, never bubbled into the calling flow.
pub struct DispatchService {
    store: Arc<StoreClient>,
    email_client: EmailClient,
    sms_client: SmsClient,
}

impl DispatchService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
            email_client: EmailClient::new(config),
            sms_client: SmsClient::new(config),
        }
    }

    /// `dispatchNotification(event)`.
    pub async fn dispatch(
        &self,
        event: NotificationEvent,
        auth_token: &str,
    ) -> Result<(), NotificationError> {
        self.dispatch_with(event, Some(auth_token)).await
    }

    /// Dispatch on service credentials; used by the sweep, which runs with
    /// no request context.
    pub async fn dispatch_system(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        self.dispatch_with(event, None).await
    }

    async fn dispatch_with(
        &self,
        event: NotificationEvent,
        auth_token: Option<&str>,
    ) -> Result<(), NotificationError> {
        debug!("Dispatching {} for appointment {}", event.event_type(), event.appointment_id());

        let contact = self.resolve_contact(event.customer_id(), auth_token).await?;

        let mut queued = 0;

        if let Some(email) = contact.email.as_deref() {
            let message = render_email(&event, contact.locale);
            let record = self
                .enqueue(&event, Channel::Email, email, &message)
                .await?;
            self.attempt_delivery(&record).await;
            queued += 1;
        }

        if let Some(phone) = contact.phone.as_deref() {
            let body = render_sms(&event, contact.locale);
            let message = RenderedMessage { subject: None, text: body, html: None };
            let record = self.enqueue(&event, Channel::Sms, phone, &message).await?;
            self.attempt_delivery(&record).await;
            queued += 1;
        }

        if queued == 0 {
            warn!("Customer {} has no reachable contact details", event.customer_id());
            return Err(NotificationError::NoContactDetails);
        }

        Ok(())
    }

    /// Try to transmit one outbox record and update its bookkeeping. Failures
    /// push `scheduled_for` back so the sweep retries later.
    pub async fn attempt_delivery(&self, record: &NotificationRecord) {
        let outcome = match record.channel {
            Channel::Email => {
                let message = RenderedMessage {
                    subject: record.subject.clone(),
                    text: record.body.clone(),
                    html: record.html_body.clone(),
                };
                self.email_client.send(&record.recipient, &message).await
            }
            Channel::Sms => self.sms_client.send(&record.recipient, &record.body).await,
        };

        let result = match outcome {
            Ok(delivery_id) => {
                info!("Notification {} delivered ({})", record.id, record.channel);
                self.mark_sent(record.id, &delivery_id).await
            }
            Err(e) => {
                warn!("Notification {} delivery failed: {}", record.id, e);
                self.mark_failed(record, &e.to_string()).await
            }
        };

        if let Err(e) = result {
            warn!("Failed to update outbox record {}: {}", record.id, e);
        }
    }

    /// Outbox rows whose retry time has come. Used by the sweep.
    pub async fn list_due(&self, limit: i32) -> Result<Vec<NotificationRecord>, NotificationError> {
        let now = Utc::now();
        let path = format!(
            "/rest/v1/notification_outbox?status=in.(pending,failed)&attempts=lt.{}&scheduled_for=lte.{}&order=scheduled_for.asc&limit={}",
            MAX_ATTEMPTS,
            urlencoding::encode(&now.to_rfc3339()),
            limit
        );

        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<NotificationRecord>, _>>()
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse outbox: {}", e)))
    }

    pub async fn list_recent(
        &self,
        limit: i32,
        auth_token: &str,
    ) -> Result<Vec<NotificationRecord>, NotificationError> {
        let path = format!(
            "/rest/v1/notification_outbox?order=created_at.desc&limit={}",
            limit
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<NotificationRecord>, _>>()
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse outbox: {}", e)))
    }

    /// Whether a reminder was already queued for this appointment; the sweep
    /// uses this to send at most one reminder per appointment.
    pub async fn reminder_exists(&self, appointment_id: Uuid) -> Result<bool, NotificationError> {
        let path = format!(
            "/rest/v1/notification_outbox?appointment_id=eq.{}&event_type=eq.reminder_due&limit=1",
            appointment_id
        );
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn resolve_contact(
        &self,
        customer_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<CustomerContact, NotificationError> {
        let path = format!("/rest/v1/customer_profiles?user_id=eq.{}", customer_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(NotificationError::NoContactDetails);
        };

        Ok(CustomerContact {
            user_id: customer_id,
            email: row["email"].as_str().map(str::to_string),
            phone: row["phone"].as_str().map(str::to_string),
            locale: row["locale"]
                .as_str()
                .map(Locale::from_tag)
                .unwrap_or_default(),
        })
    }

    async fn enqueue(
        &self,
        event: &NotificationEvent,
        channel: Channel,
        recipient: &str,
        message: &RenderedMessage,
    ) -> Result<NotificationRecord, NotificationError> {
        let now = Utc::now();
        let record_data = json!({
            "appointment_id": event.appointment_id(),
            "event_type": event.event_type(),
            "channel": channel.to_string(),
            "recipient": recipient,
            "subject": message.subject,
            "body": message.text,
            "html_body": message.html,
            "status": NotificationStatus::Pending.to_string(),
            "attempts": 0,
            "max_attempts": MAX_ATTEMPTS,
            "scheduled_for": now.to_rfc3339(),
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
                "/rest/v1/notification_outbox",
                None,
                Some(record_data),
                Some(headers),
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(NotificationError::DatabaseError(
                "Failed to create outbox record".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| NotificationError::DatabaseError(format!("Failed to parse outbox record: {}", e)))
    }

    async fn mark_sent(&self, record_id: Uuid, delivery_id: &str) -> Result<(), NotificationError> {
        let update_data = json!({
            "status": NotificationStatus::Sent.to_string(),
            "delivery_id": delivery_id,
            "updated_at": Utc::now().to_rfc3339()
        });
        self.patch_record(record_id, update_data).await
    }

    async fn mark_failed(
        &self,
        record: &NotificationRecord,
        error: &str,
    ) -> Result<(), NotificationError> {
        let attempts = record.attempts + 1;
        let next_attempt = Utc::now() + Duration::minutes(RETRY_BACKOFF_MINUTES * attempts as i64);

        let update_data = json!({
            "status": NotificationStatus::Failed.to_string(),
            "attempts": attempts,
            "last_error": error,
            "scheduled_for": next_attempt.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });
        self.patch_record(record.id, update_data).await
    }

    async fn patch_record(&self, record_id: Uuid, update_data: Value) -> Result<(), NotificationError> {
        let path = format!("/rest/v1/notification_outbox?id=eq.{}", record_id);
        let _: Vec<Value> = self
            .store
            .request(Method::PATCH, &path, None, Some(update_data))
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
