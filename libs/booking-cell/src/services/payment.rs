use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::BookingError;

/// Client for the external payment processor. The core never touches card
/// data; it requests an authorization at booking and a refund instruction at
/// cancellation, and stores only the opaque references returned.
pub struct PaymentClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PaymentClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.payment_api_url.clone(),
            api_key: config.payment_api_key.clone(),
        }
    }

    /// Request a charge authorization. The idempotency key is forwarded so a
    /// retried booking cannot double-charge.
    pub async fn authorize(
        &self,
        customer_id: Uuid,
        appointment_id: Uuid,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, BookingError> {
        debug!("Requesting payment authorization for appointment {}", appointment_id);

        let body = json!({
            "customer_id": customer_id,
            "reference": appointment_id,
            "amount": amount,
            "currency": "EUR",
            "idempotency_key": idempotency_key,
        });

        let response = self
            .client
            .post(format!("{}/v1/authorizations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment processor unreachable: {}", e);
                BookingError::DependencyUnavailable(format!("payment processor: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Payment authorization failed ({}): {}", status, text);
            return Err(BookingError::DependencyUnavailable(format!(
                "payment authorization failed ({})",
                status
            )));
        }

        let payload: Value = response.json().await.map_err(|e| {
            BookingError::DependencyUnavailable(format!("payment processor response: {}", e))
        })?;

        let payment_ref = payload["authorization_id"]
            .as_str()
            .ok_or_else(|| {
                BookingError::DependencyUnavailable("payment processor returned no authorization id".to_string())
            })?
            .to_string();

        info!("Payment authorized for appointment {} ({})", appointment_id, payment_ref);
        Ok(payment_ref)
    }

    /// Instruct the processor to refund part or all of an authorization.
    pub async fn refund(
        &self,
        payment_ref: &str,
        amount: Decimal,
    ) -> Result<String, BookingError> {
        debug!("Requesting refund of {} against {}", amount, payment_ref);

        let body = json!({
            "authorization_id": payment_ref,
            "amount": amount,
        });

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Payment processor unreachable: {}", e);
                BookingError::DependencyUnavailable(format!("payment processor: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(BookingError::DependencyUnavailable(format!(
                "refund instruction failed ({})",
                status
            )));
        }

        let payload: Value = response.json().await.map_err(|e| {
            BookingError::DependencyUnavailable(format!("payment processor response: {}", e))
        })?;

        let refund_id = payload["refund_id"].as_str().unwrap_or_default().to_string();
        info!("Refund {} issued against {}", refund_id, payment_ref);
        Ok(refund_id)
    }
}
