//! Error types for the replication engine.

use imagesync_client::ClientError;
use imagesync_codec::CodecError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during a replication run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An image-store request failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A metadata file could not be read or written.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Snapshot directory I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if the failed call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Client(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Client(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Returns true if a create hit an image that already exists.
    pub fn is_already_present(&self) -> bool {
        matches!(self, EngineError::Client(ClientError::ImageAlreadyPresent(_)))
    }
}
