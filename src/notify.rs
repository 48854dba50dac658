//! Delivery of run reports to a webhook.

use std::time::Duration;

use derive_more::{Display, Error, From};

use crate::config::{NotificationSettings, WEBHOOK_PLACEHOLDER};
use crate::report::NotificationPayload;

/// Errors on delivery of a report.
///
/// They are only ever logged. A failed notification never changes the
/// result of the backups it reports on.
#[derive(Debug, Display, Error, From)]
pub enum DeliveryError {
    #[display("Sending the notification failed: {_0}")]
    Transport(reqwest::Error),
    #[display("Webhook answered with status {_0}")]
    #[from(ignore)]
    Status(#[error(ignore)] u16),
}

/// What happened to a report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No webhook configured.
    Skipped,
}

/// Outbound webhook a report is posted to.
#[derive(Debug, Clone)]
pub struct Webhook {
    url: Option<String>,
    timeout: Duration,
}

impl Webhook {
    /// A webhook posting to `url`.
    ///
    /// An empty URL or the placeholder of the default config disables it.
    pub fn new(url: &str, timeout: Duration) -> Self {
        let url = url.trim();
        let url = (!url.is_empty() && url != WEBHOOK_PLACEHOLDER).then(|| url.to_string());

        Self { url, timeout }
    }

    pub fn from_settings(settings: &NotificationSettings) -> Self {
        Self::new(&settings.webhook_url, Duration::from_secs(settings.timeout_secs))
    }

    /// A webhook that never sends anything.
    pub fn disabled() -> Self {
        Self {
            url: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Post `payload` as JSON.
    pub fn deliver(&self, payload: &NotificationPayload) -> Result<Delivery, DeliveryError> {
        let Some(url) = &self.url else {
            log::info!(target: "notify", "No webhook configured, skipping notification");
            return Ok(Delivery::Skipped);
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.post(url).json(payload).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        log::info!(target: "notify", "Notification sent ({} section(s))", payload.embeds.len());
        Ok(Delivery::Sent)
    }
}
