//! Timeout and cancellation policy shared by every remote call.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{FailureCause, RagError, Result};

/// Default timeout for a single remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The kind of service a call goes to; decides which error variant a
/// timeout becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remote {
    /// A vector store backend, by name.
    Store(&'static str),
    /// An embedding or chat provider, by name.
    Provider(&'static str),
}

impl Remote {
    /// Build a classified error for this remote.
    pub fn error(self, cause: FailureCause, message: impl Into<String>) -> RagError {
        match self {
            Self::Store(name) => RagError::store(name, cause, message),
            Self::Provider(name) => RagError::provider(name, cause, message),
        }
    }
}

/// Races a remote call against a timeout and a cancellation token.
#[derive(Debug, Clone, Copy)]
pub struct RemoteCallPolicy {
    timeout: Duration,
}

impl Default for RemoteCallPolicy {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

impl RemoteCallPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call`, failing with [`FailureCause::Timeout`] once the timeout
    /// elapses or [`RagError::Cancelled`] once `cancel` fires.
    ///
    /// The future is dropped on either outcome, which aborts the underlying
    /// request for transports that support it.
    pub async fn guard<T, F>(
        &self,
        remote: Remote,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(RagError::Cancelled { operation: operation.to_string() })
            }
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        ?remote,
                        operation,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "remote call timed out"
                    );
                    Err(remote.error(
                        FailureCause::Timeout,
                        format!("{operation} timed out after {:?}", self.timeout),
                    ))
                }
            },
        }
    }
}

/// Classify a transport error message.
///
/// Used for clients that only expose errors as text.
pub fn classify_message(message: &str) -> FailureCause {
    let lower = message.to_ascii_lowercase();
    if lower.contains("connection refused")
        || lower.contains("tcp connect error")
        || lower.contains("error trying to connect")
        || lower.contains("transport error")
    {
        FailureCause::ConnectionRefused
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("deadline")
    {
        FailureCause::Timeout
    } else {
        FailureCause::Api
    }
}
