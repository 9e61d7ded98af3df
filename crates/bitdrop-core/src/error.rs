use thiserror::Error;

use crate::types::{FinalizeReceipt, UploadId};

pub type BitdropResult<T> = Result<T, BitdropError>;

#[derive(Debug, Error)]
pub enum BitdropError {
    #[error("chunkIndex and totalChunks must be natural numbers")]
    InvalidRange { index: i64, total: i64 },

    #[error("chunkIndex was {index}, but totalChunks is only {total}")]
    IndexOutOfBounds { index: u64, total: u64 },

    #[error("upload {upload_id} was started with totalChunks {expected}, got {got}")]
    TotalMismatch {
        upload_id: UploadId,
        expected: u64,
        got: u64,
    },

    #[error("invalid content hash: {0:?}")]
    InvalidHash(String),

    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Upload {0} contains duplicate chunkIndex values")]
    DuplicateChunk(UploadId),

    #[error("No upload found for {0}")]
    UploadNotFound(UploadId),

    #[error("No file found with ID {0}")]
    NotFound(UploadId),

    #[error("No file found with ID {upload_id} and hash {content_hash}")]
    RecordNotFound {
        upload_id: UploadId,
        content_hash: String,
    },

    #[error("Chunk {index} unavailable or ambiguous")]
    ChunkNotFound { upload_id: UploadId, index: u64 },

    #[error("Corrupted upload found for {0}")]
    CorruptUpload(UploadId),

    #[error("Multiple files found with ID {upload_id}")]
    Ambiguous { upload_id: UploadId, matches: usize },

    #[error("Not all encrypted chunks are available")]
    IncompleteUpload {
        total: u64,
        present: Vec<u64>,
        poisoned: bool,
    },

    #[error("Invalid email authentication token")]
    Unauthorized,

    #[error("upload {0} has already been finalized")]
    AlreadyFinalized(UploadId),

    #[error("Failed to send email: {reason}")]
    Delivery {
        receipt: Box<FinalizeReceipt>,
        reason: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by outer surfaces (HTTP status, metrics labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Duplicate,
    NotFound,
    Ambiguity,
    Incomplete,
    Unauthorized,
    AlreadyFinalized,
    Delivery,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Duplicate => "duplicate",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Ambiguity => "ambiguity",
            ErrorClass::Incomplete => "incomplete",
            ErrorClass::Unauthorized => "unauthorized",
            ErrorClass::AlreadyFinalized => "already_finalized",
            ErrorClass::Delivery => "delivery",
            ErrorClass::Internal => "internal",
        }
    }
}

impl BitdropError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRange { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::TotalMismatch { .. }
            | Self::InvalidHash(_)
            | Self::InvalidFilename(_) => ErrorClass::Validation,
            Self::DuplicateChunk(_) => ErrorClass::Duplicate,
            Self::UploadNotFound(_)
            | Self::NotFound(_)
            | Self::RecordNotFound { .. }
            | Self::ChunkNotFound { .. } => ErrorClass::NotFound,
            Self::CorruptUpload(_) | Self::Ambiguous { .. } => ErrorClass::Ambiguity,
            Self::IncompleteUpload { .. } => ErrorClass::Incomplete,
            Self::Unauthorized => ErrorClass::Unauthorized,
            Self::AlreadyFinalized(_) => ErrorClass::AlreadyFinalized,
            Self::Delivery { .. } => ErrorClass::Delivery,
            Self::Config(_) | Self::Io(_) | Self::Other(_) => ErrorClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_messages_are_preserved() {
        let err = BitdropError::IndexOutOfBounds { index: 4, total: 3 };
        assert_eq!(err.to_string(), "chunkIndex was 4, but totalChunks is only 3");

        let err = BitdropError::InvalidRange { index: 0, total: 3 };
        assert_eq!(
            err.to_string(),
            "chunkIndex and totalChunks must be natural numbers"
        );
    }

    #[test]
    fn classes_cover_taxonomy() {
        let id = UploadId::nil();
        assert_eq!(
            BitdropError::DuplicateChunk(id).class(),
            ErrorClass::Duplicate
        );
        assert_eq!(
            BitdropError::Ambiguous {
                upload_id: id,
                matches: 2
            }
            .class(),
            ErrorClass::Ambiguity
        );
        assert_eq!(BitdropError::Unauthorized.class(), ErrorClass::Unauthorized);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(BitdropError::from(io).class(), ErrorClass::Internal);
    }
}
