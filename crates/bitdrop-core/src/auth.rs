//! Finalize shared secret: resolved once at startup, immutable afterwards.

use secrecy::{ExposeSecret, SecretString};

use crate::config::AuthConfig;
use crate::error::{BitdropError, BitdropResult};

/// The static token a sender must present to finalize an upload.
#[derive(Debug)]
pub struct AuthSecret {
    token: Option<SecretString>,
    allow_test_mode: bool,
}

impl AuthSecret {
    pub fn new(token: Option<SecretString>, allow_test_mode: bool) -> Self {
        Self {
            token,
            allow_test_mode,
        }
    }

    /// Resolve the secret from `token_file`, falling back to `token_env`.
    ///
    /// A missing secret is not an error here: the daemon still serves reads,
    /// it just refuses every finalize that is not an allowed test.
    pub fn load(config: &AuthConfig) -> BitdropResult<Self> {
        let token = match &config.token_file {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    BitdropError::Config(format!("reading auth token {}: {e}", path.display()))
                })?;
                Some(raw.trim().to_string())
            }
            None => std::env::var(&config.token_env).ok(),
        };

        let token = token.filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(
                env = %config.token_env,
                "no finalize auth token configured; uploads cannot be completed"
            );
        }

        Ok(Self::new(token.map(SecretString::from), config.allow_test_mode))
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    /// Check a presented token. `test_mode` bypasses the check only when the
    /// deployment allows it.
    pub fn authorize(&self, presented: Option<&str>, test_mode: bool) -> BitdropResult<()> {
        if test_mode && self.allow_test_mode {
            return Ok(());
        }
        match (&self.token, presented) {
            (Some(expected), Some(given)) if expected.expose_secret() == given => Ok(()),
            _ => Err(BitdropError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn matching_token_is_authorized() {
        let secret = AuthSecret::new(Some(SecretString::from("s3cret")), false);
        assert!(secret.authorize(Some("s3cret"), false).is_ok());
        assert!(matches!(
            secret.authorize(Some("guess"), false),
            Err(BitdropError::Unauthorized)
        ));
        assert!(secret.authorize(None, false).is_err());
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        let secret = AuthSecret::new(None, false);
        assert!(secret.authorize(None, false).is_err());
        assert!(secret.authorize(Some(""), false).is_err());
    }

    #[test]
    fn test_mode_requires_opt_in() {
        let locked = AuthSecret::new(Some(SecretString::from("s3cret")), false);
        assert!(locked.authorize(None, true).is_err());

        let open = AuthSecret::new(Some(SecretString::from("s3cret")), true);
        assert!(open.authorize(None, true).is_ok());
        assert!(open.authorize(None, false).is_err());
    }

    #[test]
    fn token_file_wins_and_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();

        let config = AuthConfig {
            token_env: "BITDROP_TEST_TOKEN_UNSET_VARIABLE".into(),
            token_file: Some(file.path().to_path_buf()),
            allow_test_mode: false,
        };
        let secret = AuthSecret::load(&config).unwrap();
        assert!(secret.is_configured());
        assert!(secret.authorize(Some("from-file"), false).is_ok());
    }

    #[test]
    fn missing_token_file_is_config_error() {
        let config = AuthConfig {
            token_file: Some("/nonexistent/bitdrop/token".into()),
            ..Default::default()
        };
        assert!(matches!(
            AuthSecret::load(&config),
            Err(BitdropError::Config(_))
        ));
    }
}
