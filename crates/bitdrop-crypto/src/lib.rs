//! bitdrop-crypto: password-based encryption shared by server and clients
//!
//! Wire format of one stored chunk (text-safe, standard base64):
//! ```text
//! base64( [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag] )
//! ```
//!
//! Key schedule:
//! ```text
//! content hash (hex SHA-256 of the whole plaintext)
//!   └── salt = first 16 bytes (32 hex chars)
//!         └── key = PBKDF2-HMAC-SHA256(password, salt, 300_000 iterations, 32 bytes)
//!               └── every chunk: AES-256-GCM(key, fresh nonce)
//! ```
//!
//! Decryption never fails on a wrong password. Each chunk yields a
//! [`ChunkOutcome`]; rejected chunks contribute a marker to the assembled
//! buffer and the final SHA-256 comparison decides whether the file is intact.

pub mod assemble;
pub mod chunk;
pub mod digest;
pub mod kdf;

pub use assemble::{assemble_chunks, Assembly, ChunkOutcome};
pub use chunk::{open_chunk, seal_chunk, split_plaintext, ChunkError};
pub use digest::{sha256_hex, Sha256Stream};
pub use kdf::{derive_key, salt_from_hash, DerivedKey, KdfParams};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Number of leading hex characters of the content hash used as salt
pub const SALT_HEX_LEN: usize = 32;

/// Plaintext bytes per chunk produced by senders (5 MiB)
pub const CHUNK_SIZE: usize = 5 * 1024 * 1024;
