pub mod dispatch;
pub mod email;
pub mod sms;
pub mod sweep;
pub mod templates;

pub use dispatch::DispatchService;
pub use email::EmailClient;
pub use sms::SmsClient;
pub use sweep::NotificationSweepService;
