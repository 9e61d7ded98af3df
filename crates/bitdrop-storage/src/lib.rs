//! bitdrop-storage: filesystem layout for staged and finalized uploads
//!
//! ```text
//! root/
//! ├── staging/{upload_id}/of-{total}/{index}      chunks awaiting finalize
//! └── store/{timestamp}/{upload_id}/{hash}/{filename}/{index}
//! ```
//!
//! Index `0` in a staging directory is the poison marker written when a
//! duplicate chunk arrives; a poisoned upload can never be finalized.
//!
//! The durable paths are only a serialization. [`DurableStore`] keeps an
//! in-memory index from upload id to [`bitdrop_core::StoredFile`], rebuilt by
//! scanning `store/` at startup.

pub mod durable;
pub mod health;
pub mod layout;
pub mod staging;

pub use durable::DurableStore;
pub use health::{check_health, is_healthy};
pub use layout::{Layout, POISON_INDEX};
pub use staging::{StagingArea, StagingSnapshot};
