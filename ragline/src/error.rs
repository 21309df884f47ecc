//! Error types for the `ragline` crate.

use std::fmt;

use thiserror::Error;

/// Why a remote call failed.
///
/// Carried by [`RagError::Store`] and [`RagError::Provider`] so callers and
/// logs can tell an unreachable service from a slow one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    /// The remote endpoint refused or could not accept the connection.
    ConnectionRefused,
    /// The call did not complete within the configured timeout.
    Timeout,
    /// The remote service answered with an error.
    Api,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::Timeout => "TIMEOUT",
            Self::Api => "API_ERROR",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid caller input: bad chunk parameters, empty content, bad search arguments.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}, {cause}): {message}")]
    Store {
        /// The vector store backend that produced the error.
        backend: String,
        /// The classified failure cause.
        cause: FailureCause,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred calling an embedding or chat provider.
    #[error("Provider error ({provider}, {cause}): {message}")]
    Provider {
        /// The provider that produced the error.
        provider: String,
        /// The classified failure cause.
        cause: FailureCause,
        /// A description of the failure.
        message: String,
    },

    /// The requested document does not exist for this user.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller aborted the operation before it completed.
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// The operation that was in flight.
        operation: String,
    },
}

impl RagError {
    /// Build a [`RagError::Store`].
    pub fn store(backend: impl Into<String>, cause: FailureCause, message: impl Into<String>) -> Self {
        Self::Store { backend: backend.into(), cause, message: message.into() }
    }

    /// Build a [`RagError::Provider`].
    pub fn provider(
        provider: impl Into<String>,
        cause: FailureCause,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider { provider: provider.into(), cause, message: message.into() }
    }

    /// The classified cause for remote failures, `None` for everything else.
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::Store { cause, .. } | Self::Provider { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry (with backoff).
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Provider { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_retryable_and_classified() {
        let err = RagError::store("qdrant", FailureCause::Timeout, "deadline elapsed");
        assert!(err.is_retryable());
        assert_eq!(err.cause(), Some(FailureCause::Timeout));
        assert_eq!(err.to_string(), "Vector store error (qdrant, TIMEOUT): deadline elapsed");
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = RagError::Validation("chunk_size must be positive".into());
        assert!(!err.is_retryable());
        assert_eq!(err.cause(), None);
    }
}
