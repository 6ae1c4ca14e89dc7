//! Notification sender that writes summaries to the structured log.

use async_trait::async_trait;
use chrono_tz::Tz;
use fieldclock_core::NotificationSender;
use fieldclock_domain::{Result, RunSummary, Worker};
use tracing::info;

use super::render::{render_text, subject};

/// Emits each summary as one `info!` event. Used when no webhook is
/// configured, and always alongside one in daemon mode.
pub struct LogNotificationSender {
    timezone: Tz,
}

impl LogNotificationSender {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send_summary(&self, summary: &RunSummary, recipients: &[Worker]) -> Result<()> {
        let emails: Vec<&str> = recipients.iter().filter_map(|w| w.email.as_deref()).collect();
        info!(
            job = %summary.job(),
            outcome = ?summary.outcome(),
            error_count = summary.errors().len(),
            recipients = ?emails,
            subject = %subject(summary),
            body = %render_text(summary, self.timezone),
            "reconciliation summary"
        );
        Ok(())
    }
}
