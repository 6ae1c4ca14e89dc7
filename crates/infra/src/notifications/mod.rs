//! Notification senders for reconciliation summaries

pub mod log_sender;
pub mod render;
pub mod webhook;

use std::sync::Arc;

use chrono_tz::Tz;
use fieldclock_core::NotificationSender;
use fieldclock_domain::{NotificationConfig, Result};

pub use log_sender::LogNotificationSender;
pub use webhook::WebhookNotificationSender;

/// Pick the sender for the configuration: the webhook when a URL is set and
/// notifications are enabled, the log sender otherwise.
pub fn sender_from_config(
    config: &NotificationConfig,
    timezone: Tz,
) -> Result<Arc<dyn NotificationSender>> {
    match config.webhook_url.as_deref() {
        Some(url) if config.enabled => Ok(Arc::new(WebhookNotificationSender::new(
            url,
            std::time::Duration::from_secs(config.webhook_timeout_secs),
            timezone,
        )?)),
        _ => Ok(Arc::new(LogNotificationSender::new(timezone))),
    }
}
