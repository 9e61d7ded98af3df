//! bitdrop-transfer: the upload and retrieval pipeline
//!
//! ```text
//! ChunkReceiver ──► staging ──► UploadFinalizer ──► durable store ──┬─► ContentRetriever ──► DecryptionEngine
//!                                      │                            └─► RecordDeleter
//!                                      └─► Notifier
//! ```

pub mod decrypt;
pub mod deleter;
pub mod finalizer;
pub mod notify;
pub mod receiver;
pub mod retriever;
pub mod services;

pub use decrypt::{DecryptStatus, DecryptedFile, DecryptionEngine, DecryptionOutcome};
pub use deleter::RecordDeleter;
pub use finalizer::{CompleteRequest, FinalizerSettings, UploadFinalizer};
pub use notify::{build_notifier, Notification, Notifier};
pub use receiver::ChunkReceiver;
pub use retriever::ContentRetriever;
pub use services::Services;
