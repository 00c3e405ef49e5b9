//! Worker error types.

use std::fmt;

use thiserror::Error;

use vcomp_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] vcomp_registry::RegistryError),

    #[error("Media error: {0}")]
    Media(#[from] vcomp_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure category of a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before the source was downloaded
    Validation,
    /// Source transfer failed
    Transport,
    /// Encoder or probe failure
    Encoding,
    /// A registry read or write failed
    Registry,
    /// Local filesystem failure
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Registry => "registry",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorkerError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::InvalidJob(_) => ErrorKind::Validation,
            WorkerError::Storage(StorageError::InvalidContentId(_)) => ErrorKind::Validation,
            WorkerError::Storage(_) | WorkerError::Io(_) => ErrorKind::Storage,
            WorkerError::Registry(_) => ErrorKind::Registry,
            WorkerError::Media(e) if e.is_validation() => ErrorKind::Validation,
            WorkerError::Media(e) if e.is_transport() => ErrorKind::Transport,
            WorkerError::Media(_) => ErrorKind::Encoding,
            WorkerError::ConfigError(_) | WorkerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// A registry failure ends the attempt without a further `fail` write.
    pub fn is_registry_error(&self) -> bool {
        self.kind() == ErrorKind::Registry
    }
}
