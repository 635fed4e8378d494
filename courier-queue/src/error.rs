//! Error types for queue operations.

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a job body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A job was submitted before any lane configuration was installed
    #[error("Queue system is not configured")]
    NotConfigured,

    /// A job attempt exceeded its timeout
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// The job body returned an error
    #[error("Job execution failed: {0}")]
    ExecutionFailed(#[source] BoxError),

    /// The job body panicked
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// No Tokio runtime was available to run lane workers
    #[error("No Tokio runtime available for lane workers")]
    NoRuntime,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Whether this failure came from the attempt running out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout(_))
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = QueueError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_execution_failed_keeps_source() {
        let err = QueueError::ExecutionFailed("smtp down".into());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "Job execution failed: smtp down");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }
}
