//! Compiler-service error types.

use thiserror::Error;

/// Result type for compiler-service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the compiler-service client.
///
/// Only `ConnectionInterrupted` drives the worker's recovery state machine;
/// every other kind surfaces to the originating request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was cancelled before the daemon replied.
    #[error("request cancelled")]
    Cancelled,

    /// The daemon connection dropped (crash or shutdown) mid-request.
    #[error("connection to the compiler service interrupted")]
    ConnectionInterrupted,

    /// The daemon rejected or failed the request.
    #[error("request failed: {0}")]
    Failed(String),

    /// No reply within the configured deadline.
    #[error("request timed out")]
    TimedOut,

    /// The client library does not export a required symbol.
    #[error("client library missing required symbol: {0}")]
    MissingRequiredSymbol(String),

    /// The client library could not be loaded.
    #[error("failed to load client library: {0}")]
    Load(#[from] libloading::Error),
}

impl ServiceError {
    /// Create a request-failed error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error must drive the crash-recovery path.
    pub fn is_connection_interrupted(&self) -> bool {
        matches!(self, Self::ConnectionInterrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ServiceError::Cancelled.to_string(), "request cancelled");
        assert_eq!(
            ServiceError::failed("bad request").to_string(),
            "request failed: bad request"
        );
        assert_eq!(
            ServiceError::MissingRequiredSymbol("skd_initialize".into()).to_string(),
            "client library missing required symbol: skd_initialize"
        );
    }

    #[test]
    fn test_only_interrupt_triggers_recovery() {
        assert!(ServiceError::ConnectionInterrupted.is_connection_interrupted());
        assert!(!ServiceError::TimedOut.is_connection_interrupted());
        assert!(!ServiceError::Cancelled.is_connection_interrupted());
        assert!(!ServiceError::failed("x").is_connection_interrupted());
    }
}
