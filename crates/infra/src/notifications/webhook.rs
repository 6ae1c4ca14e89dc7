//! Webhook notification sender
//!
//! POSTs a JSON envelope with the structured summary, the rendered text, and
//! the recipient list. A single attempt per summary; callers log failures.

use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use fieldclock_core::NotificationSender;
use fieldclock_domain::{FieldClockError, Result, RunSummary, Worker};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::render::{render_text, subject};
use crate::errors::InfraError;

const USER_AGENT: &str = concat!("fieldclock/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
    full_name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    subject: String,
    text: String,
    recipients: Vec<Recipient<'a>>,
    summary: &'a RunSummary,
}

/// Sends summaries to an HTTP endpoint.
#[derive(Clone)]
pub struct WebhookNotificationSender {
    client: Client,
    url: String,
    timezone: Tz,
}

impl WebhookNotificationSender {
    pub fn new(url: impl Into<String>, timeout: Duration, timezone: Tz) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FieldClockError::from(InfraError::from(e)))?;

        Ok(Self { client, url: url.into(), timezone })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send_summary(&self, summary: &RunSummary, recipients: &[Worker]) -> Result<()> {
        let envelope = Envelope {
            subject: subject(summary),
            text: render_text(summary, self.timezone),
            recipients: recipients
                .iter()
                .filter_map(|w| {
                    w.email.as_deref().map(|email| Recipient {
                        id: &w.id,
                        full_name: &w.full_name,
                        email,
                    })
                })
                .collect(),
            summary,
        };

        debug!(url = %self.url, job = %summary.job(), "posting reconciliation summary");

        let response = self
            .client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| FieldClockError::from(InfraError::from(e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = format!("webhook responded with {status}");
        Err(match status {
            StatusCode::NOT_FOUND => FieldClockError::NotFound(message),
            s if s.is_client_error() && s != StatusCode::TOO_MANY_REQUESTS => {
                FieldClockError::InvalidInput(message)
            }
            _ => FieldClockError::Network(message),
        })
    }
}
