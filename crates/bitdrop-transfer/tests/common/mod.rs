//! Shared fixtures for the transfer integration tests
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use bitdrop_core::{AuthSecret, BitdropConfig, UploadId};
use bitdrop_crypto::{derive_key, salt_from_hash, seal_chunk, sha256_hex, split_plaintext, KdfParams};
use bitdrop_transfer::{CompleteRequest, Notification, Notifier, Services};
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::sync::Mutex;

pub const PASSWORD: &str = "correct-horse-battery-staple";
pub const TOKEN: &str = "finalize-token";
/// Fast KDF for tests
pub const ITERATIONS: u32 = 1_000;

pub struct Harness {
    pub tmp: TempDir,
    pub services: Services,
}

pub async fn harness(notifier: Arc<dyn Notifier>, allow_test_mode: bool) -> Harness {
    let tmp = TempDir::new().unwrap();
    let mut config = BitdropConfig::default();
    config.storage.root = tmp.path().to_path_buf();
    config.crypto.pbkdf2_iterations = ITERATIONS;
    let auth = AuthSecret::new(Some(SecretString::from(TOKEN)), allow_test_mode);
    let services = Services::open(&config, auth, notifier)
        .await
        .expect("open services");
    Harness { tmp, services }
}

/// A file as a sender would submit it.
pub struct Sealed {
    pub hash: String,
    pub chunks: Vec<String>,
}

pub fn seal(data: &[u8], password: &str, chunk_size: usize) -> Sealed {
    let hash = sha256_hex(data);
    let salt = salt_from_hash(&hash).unwrap();
    let key = derive_key(
        &SecretString::from(password),
        &salt,
        &KdfParams {
            iterations: ITERATIONS,
        },
    )
    .unwrap();
    let chunks = split_plaintext(data, chunk_size)
        .into_iter()
        .map(|part| seal_chunk(&key, part).unwrap())
        .collect();
    Sealed { hash, chunks }
}

pub async fn upload(services: &Services, id: &UploadId, chunks: &[String]) {
    let total = chunks.len() as i64;
    for (i, chunk) in chunks.iter().enumerate() {
        services
            .receiver
            .receive(id, i as i64 + 1, total, chunk)
            .await
            .expect("receive chunk");
    }
}

pub fn request(id: UploadId, hash: &str, filename: &str) -> CompleteRequest {
    CompleteRequest {
        upload_id: id,
        content_hash: hash.to_string(),
        recipient: "recipient@example.com".into(),
        filename: filename.to_string(),
        auth_token: Some(SecretString::from(TOKEN)),
        message: None,
        test_mode: false,
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<Option<String>> {
        let mut sent = self.sent.lock().await;
        sent.push(notification.clone());
        Ok(Some(format!("msg-{}", sent.len())))
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _notification: &Notification) -> anyhow::Result<Option<String>> {
        anyhow::bail!("mail relay unreachable")
    }
}
