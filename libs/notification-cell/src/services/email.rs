use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{NotificationError, RenderedMessage};

/// Client for the external email transmission collaborator. It receives a
/// fully rendered payload and returns an opaque delivery id.
pub struct EmailClient {
    client: Client,
    base_url: String,
    api_key: String,
    sender: String,
}

impl EmailClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            sender: config.email_sender.clone(),
        }
    }

    pub async fn send(
        &self,
        recipient: &str,
        message: &RenderedMessage,
    ) -> Result<String, NotificationError> {
        debug!("Sending email to {}", recipient);

        let body = json!({
            "from": self.sender,
            "to": recipient,
            "subject": message.subject,
            "text": message.text,
            "html": message.html,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Email collaborator unreachable: {}", e);
                NotificationError::TransmissionFailed(format!("email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(NotificationError::TransmissionFailed(format!(
                "email delivery rejected ({})",
                status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| NotificationError::TransmissionFailed(format!("email response: {}", e)))?;

        Ok(payload["delivery_id"].as_str().unwrap_or_default().to_string())
    }
}
