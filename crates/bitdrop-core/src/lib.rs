//! bitdrop-core: shared types, config schema, error taxonomy, and the
//! finalize shared secret.

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

pub use auth::AuthSecret;
pub use config::BitdropConfig;
pub use error::{BitdropError, BitdropResult, ErrorClass};
pub use types::{
    ChunkSet, ContentHash, FileName, FinalizeReceipt, SingleChunk, StagedChunk, StoreKey,
    StoredFile, UploadId,
};
