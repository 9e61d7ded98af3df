//! Upload finalize: staging → durable store → notification
//!
//! Checks run in a fixed order: staging exists, exactly one total directory,
//! every chunk present, shared secret. Only then is the durable record
//! created (exclusively), the chunks copied and the staging area dropped.
//! Notification happens after the commit and never undoes it.

use std::sync::Arc;

use bitdrop_core::types::retrieval_link;
use bitdrop_core::{
    AuthSecret, BitdropConfig, BitdropError, BitdropResult, ContentHash, FileName,
    FinalizeReceipt, StoreKey, UploadId,
};
use bitdrop_storage::{DurableStore, StagingArea};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::notify::{Notification, Notifier};

/// Timestamp segment of durable keys.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A sender's request to complete an upload.
#[derive(Debug)]
pub struct CompleteRequest {
    pub upload_id: UploadId,
    pub content_hash: String,
    pub recipient: String,
    pub filename: String,
    pub auth_token: Option<SecretString>,
    pub message: Option<String>,
    pub test_mode: bool,
}

/// Message text and link base for notifications.
#[derive(Debug, Clone)]
pub struct FinalizerSettings {
    pub public_url: String,
    pub sender: String,
    pub subject: String,
    pub default_message: String,
}

impl From<&BitdropConfig> for FinalizerSettings {
    fn from(config: &BitdropConfig) -> Self {
        Self {
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            sender: config.notify.sender.clone(),
            subject: config.notify.subject.clone(),
            default_message: config.notify.default_message.clone(),
        }
    }
}

pub struct UploadFinalizer {
    staging: StagingArea,
    store: Arc<DurableStore>,
    auth: Arc<AuthSecret>,
    notifier: Arc<dyn Notifier>,
    settings: FinalizerSettings,
}

impl UploadFinalizer {
    pub fn new(
        staging: StagingArea,
        store: Arc<DurableStore>,
        auth: Arc<AuthSecret>,
        notifier: Arc<dyn Notifier>,
        settings: FinalizerSettings,
    ) -> Self {
        Self {
            staging,
            store,
            auth,
            notifier,
            settings,
        }
    }

    /// Promote a complete upload into the durable store and notify the
    /// recipient.
    ///
    /// A notification failure comes back as `BitdropError::Delivery` carrying
    /// the receipt of the upload, which stays committed.
    pub async fn complete(&self, request: CompleteRequest) -> BitdropResult<FinalizeReceipt> {
        let upload_id = request.upload_id;
        info!(
            upload_id = %upload_id,
            filename = %request.filename,
            recipient = %request.recipient,
            test_mode = request.test_mode,
            "completing upload"
        );

        let snapshot = self.staging.snapshot(&upload_id).await?;
        snapshot.ensure_complete()?;

        let presented = request.auth_token.as_ref().map(|t| t.expose_secret());
        if let Err(e) = self.auth.authorize(presented, request.test_mode) {
            warn!(upload_id = %upload_id, "finalize rejected: invalid auth token");
            return Err(e);
        }

        let content_hash = ContentHash::parse(&request.content_hash)?;
        let filename = FileName::parse(&request.filename)?;

        let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let key = StoreKey {
            timestamp: timestamp.clone(),
            upload_id,
            content_hash,
            filename,
        };
        self.store.promote(&key, &snapshot).await?;

        if let Err(e) = self.staging.discard(&upload_id).await {
            // the sweeper will collect it
            warn!(upload_id = %upload_id, "failed to discard staging area: {e}");
        }

        let mut receipt = FinalizeReceipt {
            upload_id,
            filename: request.filename.clone(),
            timestamp,
            delivery_id: None,
            link: retrieval_link(&upload_id),
        };

        if request.test_mode {
            return Ok(receipt);
        }

        let notification = self.notification(&request);
        match self.notifier.send(&notification).await {
            Ok(delivery_id) => {
                receipt.delivery_id = delivery_id;
                Ok(receipt)
            }
            Err(e) => {
                warn!(upload_id = %upload_id, "notification failed after commit: {e:#}");
                Err(BitdropError::Delivery {
                    receipt: Box::new(receipt),
                    reason: format!("{e:#}"),
                })
            }
        }
    }

    fn notification(&self, request: &CompleteRequest) -> Notification {
        let message = request
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.settings.default_message);
        Notification {
            from: self.settings.sender.clone(),
            to: request.recipient.clone(),
            subject: self.settings.subject.clone(),
            body: format!(
                "{message}\n\nDownload the file {} from {}{}",
                request.filename,
                self.settings.public_url,
                retrieval_link(&request.upload_id)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FinalizerSettings {
        FinalizerSettings::from(&BitdropConfig::default())
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = BitdropConfig::default();
        config.server.public_url = "https://drop.example.org/".into();
        let settings = FinalizerSettings::from(&config);
        assert_eq!(settings.public_url, "https://drop.example.org");
        assert_eq!(settings.subject, "A file was shared with you on BitDrop!");
    }

    #[test]
    fn test_request_debug_redacts_token() {
        let request = CompleteRequest {
            upload_id: UploadId::nil(),
            content_hash: "abcd".into(),
            recipient: "a@example.com".into(),
            filename: "f.txt".into(),
            auth_token: Some(SecretString::from("hunter2")),
            message: None,
            test_mode: false,
        };
        assert!(!format!("{request:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_notification_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = bitdrop_storage::Layout::new(tmp.path());
        let finalizer = UploadFinalizer::new(
            StagingArea::new(layout.clone()),
            Arc::new(DurableStore::open(layout).await.unwrap()),
            Arc::new(AuthSecret::new(None, false)),
            Arc::new(crate::notify::NullNotifier),
            settings(),
        );
        let id = UploadId::nil();
        let mut request = CompleteRequest {
            upload_id: id,
            content_hash: "abcd".into(),
            recipient: "a@example.com".into(),
            filename: "report.pdf".into(),
            auth_token: None,
            message: Some("Here you go".into()),
            test_mode: false,
        };

        let n = finalizer.notification(&request);
        assert_eq!(n.to, "a@example.com");
        assert_eq!(
            n.body,
            format!("Here you go\n\nDownload the file report.pdf from http://localhost:5173/verify?id={id}")
        );

        request.message = Some("   ".into());
        let n = finalizer.notification(&request);
        assert!(n.body.starts_with("Someone has shared a file with you on BitDrop!\n\n"));
    }
}
