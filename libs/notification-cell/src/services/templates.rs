use chrono::{DateTime, Utc};

use crate::models::{Locale, NotificationEvent, RenderedMessage};

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Render the email payload for an event. Templates are fixed per event type
/// and locale; there is no free-form message construction anywhere else.
pub fn render_email(event: &NotificationEvent, locale: Locale) -> RenderedMessage {
    match (event, locale) {
        (
            NotificationEvent::BookingCreated { provider_name, service_name, start_time, .. },
            Locale::En,
        ) => {
            let text = format!(
                "Your {} appointment at {} is booked for {}.",
                service_name,
                provider_name,
                format_time(start_time)
            );
            RenderedMessage {
                subject: Some(format!("Booking confirmed at {}", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (
            NotificationEvent::BookingCreated { provider_name, service_name, start_time, .. },
            Locale::Zh,
        ) => {
            let text = format!(
                "您在{}预约的{}已确认，时间：{}。",
                provider_name,
                service_name,
                format_time(start_time)
            );
            RenderedMessage {
                subject: Some(format!("{}预约成功", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (
            NotificationEvent::BookingCancelled {
                provider_name,
                start_time,
                refund_percentage,
                refund_amount,
                ..
            },
            Locale::En,
        ) => {
            let text = format!(
                "Your appointment at {} on {} was cancelled. Refund: {}% ({}).",
                provider_name,
                format_time(start_time),
                refund_percentage,
                refund_amount
            );
            RenderedMessage {
                subject: Some(format!("Booking cancelled at {}", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (
            NotificationEvent::BookingCancelled {
                provider_name,
                start_time,
                refund_percentage,
                refund_amount,
                ..
            },
            Locale::Zh,
        ) => {
            let text = format!(
                "您在{}、{}的预约已取消。退款：{}%（{}）。",
                provider_name,
                format_time(start_time),
                refund_percentage,
                refund_amount
            );
            RenderedMessage {
                subject: Some(format!("{}预约已取消", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (
            NotificationEvent::BookingRescheduled {
                provider_name,
                old_start_time,
                new_start_time,
                ..
            },
            Locale::En,
        ) => {
            let text = format!(
                "Your appointment at {} moved from {} to {}.",
                provider_name,
                format_time(old_start_time),
                format_time(new_start_time)
            );
            RenderedMessage {
                subject: Some(format!("Booking rescheduled at {}", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (
            NotificationEvent::BookingRescheduled {
                provider_name,
                old_start_time,
                new_start_time,
                ..
            },
            Locale::Zh,
        ) => {
            let text = format!(
                "您在{}的预约已从{}改至{}。",
                provider_name,
                format_time(old_start_time),
                format_time(new_start_time)
            );
            RenderedMessage {
                subject: Some(format!("{}预约已改期", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (NotificationEvent::ReminderDue { provider_name, start_time, .. }, Locale::En) => {
            let text = format!(
                "Reminder: your appointment at {} is coming up on {}.",
                provider_name,
                format_time(start_time)
            );
            RenderedMessage {
                subject: Some(format!("Upcoming appointment at {}", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
        (NotificationEvent::ReminderDue { provider_name, start_time, .. }, Locale::Zh) => {
            let text = format!(
                "提醒：您在{}的预约即将开始，时间：{}。",
                provider_name,
                format_time(start_time)
            );
            RenderedMessage {
                subject: Some(format!("{}预约提醒", provider_name)),
                html: Some(format!("<p>{}</p>", text)),
                text,
            }
        }
    }
}

/// Render the SMS body for an event; kept short on purpose.
pub fn render_sms(event: &NotificationEvent, locale: Locale) -> String {
    match (event, locale) {
        (NotificationEvent::BookingCreated { provider_name, start_time, .. }, Locale::En) => {
            format!("Booked: {} on {}.", provider_name, format_time(start_time))
        }
        (NotificationEvent::BookingCreated { provider_name, start_time, .. }, Locale::Zh) => {
            format!("预约成功：{}，{}。", provider_name, format_time(start_time))
        }
        (
            NotificationEvent::BookingCancelled { provider_name, refund_percentage, .. },
            Locale::En,
        ) => {
            format!("Cancelled: {} ({}% refund).", provider_name, refund_percentage)
        }
        (
            NotificationEvent::BookingCancelled { provider_name, refund_percentage, .. },
            Locale::Zh,
        ) => {
            format!("已取消：{}（退款{}%）。", provider_name, refund_percentage)
        }
        (NotificationEvent::BookingRescheduled { provider_name, new_start_time, .. }, Locale::En) => {
            format!("Moved: {} now on {}.", provider_name, format_time(new_start_time))
        }
        (NotificationEvent::BookingRescheduled { provider_name, new_start_time, .. }, Locale::Zh) => {
            format!("已改期：{}，新时间{}。", provider_name, format_time(new_start_time))
        }
        (NotificationEvent::ReminderDue { provider_name, start_time, .. }, Locale::En) => {
            format!("Reminder: {} on {}.", provider_name, format_time(start_time))
        }
        (NotificationEvent::ReminderDue { provider_name, start_time, .. }, Locale::Zh) => {
            format!("提醒：{}，{}。", provider_name, format_time(start_time))
        }
    }
}
