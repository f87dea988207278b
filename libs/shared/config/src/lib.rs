use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_anon_key: String,
    pub jwt_secret: String,
    pub payment_api_url: String,
    pub payment_api_key: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_sender: String,
    pub sms_api_url: String,
    pub sms_api_key: String,
    pub sms_sender: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_url: env::var("STORE_URL").unwrap_or_else(|_| {
                warn!("STORE_URL not set, using empty value");
                String::new()
            }),
            store_anon_key: env::var("STORE_ANON_KEY").unwrap_or_else(|_| {
                warn!("STORE_ANON_KEY not set, using empty value");
                String::new()
            }),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                warn!("JWT_SECRET not set, using empty value");
                String::new()
            }),
            payment_api_url: env::var("PAYMENT_API_URL").unwrap_or_else(|_| {
                warn!("PAYMENT_API_URL not set, using empty value");
                String::new()
            }),
            payment_api_key: env::var("PAYMENT_API_KEY").unwrap_or_else(|_| {
                warn!("PAYMENT_API_KEY not set, using empty value");
                String::new()
            }),
            email_api_url: env::var("EMAIL_API_URL").unwrap_or_else(|_| {
                warn!("EMAIL_API_URL not set, using empty value");
                String::new()
            }),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_else(|_| {
                warn!("EMAIL_API_KEY not set, using empty value");
                String::new()
            }),
            email_sender: env::var("EMAIL_SENDER").unwrap_or_else(|_| {
                warn!("EMAIL_SENDER not set, using default");
                "bookings@velora.app".to_string()
            }),
            sms_api_url: env::var("SMS_API_URL").unwrap_or_else(|_| {
                warn!("SMS_API_URL not set, using empty value");
                String::new()
            }),
            sms_api_key: env::var("SMS_API_KEY").unwrap_or_else(|_| {
                warn!("SMS_API_KEY not set, using empty value");
                String::new()
            }),
            sms_sender: env::var("SMS_SENDER").unwrap_or_else(|_| {
                warn!("SMS_SENDER not set, using default");
                "Velora".to_string()
            }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_url.is_empty() && !self.store_anon_key.is_empty() && !self.jwt_secret.is_empty()
    }

    pub fn is_payments_configured(&self) -> bool {
        !self.payment_api_url.is_empty() && !self.payment_api_key.is_empty()
    }

    pub fn is_notifications_configured(&self) -> bool {
        !self.email_api_url.is_empty() || !self.sms_api_url.is_empty()
    }
}
