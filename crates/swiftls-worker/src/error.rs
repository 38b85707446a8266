//! Worker error types.

use thiserror::Error;

use swiftls_text::DocumentError;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced at the worker boundary.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The request is malformed (bad range, unknown command, bad arguments).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced document or resource is not known.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure, including daemon-reported request failures.
    #[error("{0}")]
    Unknown(String),

    /// The compiler-service connection dropped; recovery is in progress.
    #[error("connection to the compiler service interrupted")]
    ConnectionInterrupted,
}

impl WorkerError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown(message.into())
    }
}

impl From<DocumentError> for WorkerError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotOpen(uri) => Self::NotFound(uri),
            DocumentError::InvalidRange { .. } => Self::InvalidRequest(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            WorkerError::invalid_request("bad range").to_string(),
            "invalid request: bad range"
        );
        assert_eq!(
            WorkerError::not_found("file:///a.swift").to_string(),
            "not found: file:///a.swift"
        );
        assert_eq!(WorkerError::unknown("boom").to_string(), "boom");
    }

    #[test]
    fn test_document_error_conversion() {
        let err: WorkerError = DocumentError::NotOpen("file:///a.swift".into()).into();
        assert!(matches!(err, WorkerError::NotFound(_)));

        let err: WorkerError = DocumentError::InvalidRange {
            line: 3,
            character: 7,
        }
        .into();
        assert!(matches!(err, WorkerError::InvalidRequest(_)));
    }
}
