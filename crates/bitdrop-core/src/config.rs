use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// PBKDF2-HMAC-SHA256 iteration count expected by the browser client.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 300_000;

/// Top-level server configuration (loaded from bitdrop.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BitdropConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub crypto: CryptoConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP API listen address (default: 0.0.0.0:8000)
    pub listen: String,
    /// Public site URL used to build the link in notifications
    pub public_url: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Request body limit in bytes; must fit one base64-encoded chunk
    pub max_body_bytes: usize,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root holding `staging/` and `store/`
    pub root: PathBuf,
    /// Staging areas untouched for longer than this are swept
    pub staging_max_age_secs: u64,
    /// Sweep period in seconds (0 = never sweep)
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding the finalize shared secret
    pub token_env: String,
    /// File holding the shared secret (takes precedence over `token_env`)
    pub token_file: Option<PathBuf>,
    /// Honour the `unit_test` flag on finalize requests
    pub allow_test_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2 iterations; must match what senders use
    pub pbkdf2_iterations: u32,
}

/// Which notification collaborator finalize talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyBackend {
    /// No delivery; finalize returns a null delivery id
    None,
    /// Write the notification to the log
    Log,
    /// POST the notification as JSON to `webhook_url`
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub backend: NotifyBackend,
    /// Endpoint for the webhook backend
    pub webhook_url: Option<String>,
    /// Sender address passed to the delivery service
    pub sender: String,
    /// Subject line of the notification
    pub subject: String,
    /// Message used when the sender leaves it blank
    pub default_message: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            public_url: "http://localhost:5173".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            max_body_bytes: 16 * 1024 * 1024,
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/bitdrop"),
            staging_max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: "BITDROP_AUTH_TOKEN".into(),
            token_file: None,
            allow_test_mode: false,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: NotifyBackend::Log,
            webhook_url: None,
            sender: "bitdrop@localhost".into(),
            subject: "A file was shared with you on BitDrop!".into(),
            default_message: "Someone has shared a file with you on BitDrop!".into(),
        }
    }
}

impl BitdropConfig {
    /// Reject configurations the daemon cannot run with and warn about weak ones.
    pub fn validate(&self) -> Result<(), crate::BitdropError> {
        if self.notify.backend == NotifyBackend::Webhook && self.notify.webhook_url.is_none() {
            return Err(crate::BitdropError::Config(
                "notify.backend = \"webhook\" requires notify.webhook_url".into(),
            ));
        }
        if self.crypto.pbkdf2_iterations == 0 {
            return Err(crate::BitdropError::Config(
                "crypto.pbkdf2_iterations must be positive".into(),
            ));
        }
        if self.crypto.pbkdf2_iterations < DEFAULT_PBKDF2_ITERATIONS {
            tracing::warn!(
                iterations = self.crypto.pbkdf2_iterations,
                recommended = DEFAULT_PBKDF2_ITERATIONS,
                "pbkdf2_iterations below the browser client's count; \
                 files sent from the web UI will not decrypt"
            );
        }
        if self.auth.allow_test_mode {
            tracing::warn!(
                "auth.allow_test_mode is enabled: finalize requests flagged as tests \
                 skip the shared-secret check"
            );
        }
        Ok(())
    }
}
