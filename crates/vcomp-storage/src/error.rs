//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;
use vcomp_models::ContentIdError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid content id: {0}")]
    InvalidContentId(#[from] ContentIdError),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Delete failed for {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn create_dir_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDirFailed {
            path: path.into(),
            source,
        }
    }

    pub fn delete_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DeleteFailed {
            path: path.into(),
            source,
        }
    }
}
