//! Key derivation: PBKDF2-HMAC-SHA256 password → chunk key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_HEX_LEN};

/// A 256-bit AES key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// HMAC-SHA256 iterations (default: 300_000, the browser client's count)
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 300_000,
        }
    }
}

/// Salt for a stored file: the first 16 bytes (32 hex chars) of its content
/// hash, or the whole hash when it is shorter than that.
pub fn salt_from_hash(content_hash: &str) -> anyhow::Result<Vec<u8>> {
    let prefix = content_hash
        .get(..content_hash.len().min(SALT_HEX_LEN))
        .ok_or_else(|| anyhow::anyhow!("content hash is not ASCII hex: {content_hash:?}"))?;
    hex::decode(prefix).map_err(|e| anyhow::anyhow!("content hash prefix is not hex: {e}"))
}

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// Deliberately slow; call from a blocking context.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> anyhow::Result<DerivedKey> {
    if params.iterations == 0 {
        anyhow::bail!("PBKDF2 iteration count must be positive");
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    );

    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    Ok(derived)
}
