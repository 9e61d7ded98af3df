//! Local encryption and decryption, the same scheme the browser client uses.

use anyhow::Result;
use bitdrop_crypto::{
    assemble_chunks, derive_key, salt_from_hash, seal_chunk, sha256_hex, split_plaintext,
    Assembly, KdfParams,
};
use rand::Rng;
use secrecy::SecretString;

/// Length of generated passwords
const GENERATED_PASSWORD_LEN: usize = 20;

/// A file ready for upload.
#[derive(Debug)]
pub struct SealedFile {
    /// Hex SHA-256 of the plaintext; also the salt source
    pub content_hash: String,
    pub chunks: Vec<String>,
    pub plaintext_len: usize,
}

/// Hash, derive the key and seal every `chunk_size` slice of `data`.
pub fn seal_file(
    data: &[u8],
    password: &SecretString,
    params: &KdfParams,
    chunk_size: usize,
) -> Result<SealedFile> {
    let content_hash = sha256_hex(data);
    let salt = salt_from_hash(&content_hash)?;
    let key = derive_key(password, &salt, params)?;

    let chunks = split_plaintext(data, chunk_size)
        .into_iter()
        .map(|part| seal_chunk(&key, part))
        .collect::<Result<Vec<_>>>()?;

    Ok(SealedFile {
        content_hash,
        chunks,
        plaintext_len: data.len(),
    })
}

/// Decrypt downloaded chunks. Never fails on a wrong password; check
/// [`Assembly::matches`] against `content_hash`.
pub fn open_file(
    chunks: &[String],
    content_hash: &str,
    password: &SecretString,
    params: &KdfParams,
) -> Result<Assembly> {
    let salt = salt_from_hash(content_hash)?;
    let key = derive_key(password, &salt, params)?;
    Ok(assemble_chunks(&key, chunks))
}

pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
