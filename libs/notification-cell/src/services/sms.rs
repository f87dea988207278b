use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::NotificationError;

/// Client for the external SMS transmission collaborator.
pub struct SmsClient {
    client: Client,
    base_url: String,
    api_key: String,
    sender: String,
}

impl SmsClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.sms_api_url.clone(),
            api_key: config.sms_api_key.clone(),
            sender: config.sms_sender.clone(),
        }
    }

    pub async fn send(&self, recipient: &str, body: &str) -> Result<String, NotificationError> {
        debug!("Sending SMS to {}", recipient);

        let payload = json!({
            "from": self.sender,
            "to": recipient,
            "body": body,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("SMS collaborator unreachable: {}", e);
                NotificationError::TransmissionFailed(format!("sms: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(NotificationError::TransmissionFailed(format!(
                "sms delivery rejected ({})",
                status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| NotificationError::TransmissionFailed(format!("sms response: {}", e)))?;

        Ok(payload["delivery_id"].as_str().unwrap_or_default().to_string())
    }
}
