//! Error types for image-store clients.

use imagesync_codec::CodecError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to an image store.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Credentials were rejected (HTTP 401/403).
    #[error("authentication failed (HTTP {status}): {message}")]
    Authentication {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Malformed request or remote fault (HTTP 400, 5xx, anything unexpected).
    #[error("server error (HTTP {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The image already exists on the store (HTTP 409).
    #[error("image already present: {0}")]
    ImageAlreadyPresent(String),

    /// An upload was accepted but the response does not describe an image.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Network or connection error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Response body did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Metadata could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Payload I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Maps a non-success HTTP status to its error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ClientError::Authentication { status, message },
            409 => ClientError::ImageAlreadyPresent(message),
            _ => ClientError::ServerError { status, message },
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error should abort a whole replication run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Authentication { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        for status in [400, 404, 500, 502, 503] {
            assert!(matches!(
                ClientError::from_status(status, ""),
                ClientError::ServerError { .. }
            ));
        }
        for status in [401, 403] {
            assert!(matches!(
                ClientError::from_status(status, ""),
                ClientError::Authentication { .. }
            ));
        }
        assert!(matches!(
            ClientError::from_status(409, "abc"),
            ClientError::ImageAlreadyPresent(ref m) if m == "abc"
        ));
    }

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection reset").is_retryable());
        assert!(!ClientError::transport_fatal("invalid certificate").is_retryable());
        assert!(ClientError::from_status(500, "").is_retryable());
        assert!(ClientError::from_status(503, "").is_retryable());
        assert!(!ClientError::from_status(400, "").is_retryable());
        assert!(!ClientError::from_status(401, "").is_retryable());
        assert!(!ClientError::from_status(409, "").is_retryable());
        assert!(!ClientError::Upload("no body".into()).is_retryable());
    }

    #[test]
    fn only_auth_failures_are_fatal() {
        assert!(ClientError::from_status(401, "").is_fatal());
        assert!(ClientError::from_status(403, "").is_fatal());
        assert!(!ClientError::from_status(500, "").is_fatal());
        assert!(!ClientError::transport_fatal("x").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = ClientError::from_status(503, "GET /v1/images/detail");
        assert_eq!(
            err.to_string(),
            "server error (HTTP 503): GET /v1/images/detail"
        );
    }
}
