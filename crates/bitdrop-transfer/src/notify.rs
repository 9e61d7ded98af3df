//! Outbound notification collaborator
//!
//! Finalize hands the recipient a message with the retrieval link. The
//! delivery service is pluggable; the daemon picks one from `[notify]`.

use std::sync::Arc;

use async_trait::async_trait;
use bitdrop_core::config::{NotifyBackend, NotifyConfig};
use bitdrop_core::{BitdropError, BitdropResult};
use serde::Serialize;
use tracing::{debug, info};

/// One message to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Returns the delivery id when the service
    /// reports one.
    async fn send(&self, notification: &Notification) -> anyhow::Result<Option<String>>;
}

/// Drops every notification.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<Option<String>> {
        debug!(to = %notification.to, "notification delivery disabled");
        Ok(None)
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<Option<String>> {
        let id = format!("log-{}", uuid::Uuid::new_v4());
        info!(
            delivery_id = %id,
            from = %notification.from,
            to = %notification.to,
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(Some(id))
    }
}

/// POSTs notifications as JSON to a mail relay.
///
/// The relay answers with a JSON object; its `MessageId` or `id` field, when
/// present, becomes the delivery id.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let id = ["MessageId", "id"]
            .iter()
            .find_map(|field| body.get(field).and_then(|v| v.as_str()))
            .map(str::to_string);

        debug!(to = %notification.to, delivery_id = ?id, "notification delivered via webhook");
        Ok(id)
    }
}

/// Build the notifier selected by `[notify]`.
pub fn build_notifier(config: &NotifyConfig) -> BitdropResult<Arc<dyn Notifier>> {
    match config.backend {
        NotifyBackend::None => Ok(Arc::new(NullNotifier)),
        NotifyBackend::Log => Ok(Arc::new(LogNotifier)),
        NotifyBackend::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                BitdropError::Config("notify.backend = \"webhook\" requires notify.webhook_url".into())
            })?;
            Ok(Arc::new(WebhookNotifier::new(url)))
        }
    }
}
