//! File Service Errors

use thiserror::Error;

use super::store::StoreError;
use crate::media::MediaError;

/// Errors returned by file operations.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),

    /// A file with this name already exists for the owner.
    #[error("File already exists: {0}")]
    DuplicateName(String),

    /// Batch upload conflicts, reported together before anything is written.
    #[error("Files already exist: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),

    /// The operation needs an image and the file is not one.
    #[error("Unsupported file kind: {0}")]
    UnsupportedKind(String),

    #[error("Images are not accepted here: {0}")]
    ImagesNotAllowed(String),

    #[error(transparent)]
    DecodeFailure(#[from] MediaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking derivation task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for FileError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}
