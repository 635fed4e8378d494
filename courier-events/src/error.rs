//! Listener error type

use courier_queue::QueueError;
use std::time::Duration;

/// Error produced while handling an event.
///
/// Listener bodies return it; the bus also produces it for timeouts,
/// panics and queue misconfiguration. All of them reach the on-error hooks.
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("Queue system is not configured")]
    QueueNotConfigured,

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Isolated execution failed: {0}")]
    Isolation(String),
}

impl EventHandlerError {
    /// Shorthand for [`EventHandlerError::HandlerFailed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::HandlerFailed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<QueueError> for EventHandlerError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::NotConfigured => Self::QueueNotConfigured,
            QueueError::Timeout(timeout) => Self::Timeout(timeout),
            QueueError::ExecutionFailed(source) => match source.downcast::<EventHandlerError>() {
                Ok(original) => *original,
                Err(other) => Self::HandlerFailed(other.to_string()),
            },
            QueueError::Panicked(message) => Self::Panicked(message),
            QueueError::Config(message) => Self::ProcessingError(message),
            QueueError::NoRuntime => Self::ProcessingError(QueueError::NoRuntime.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_runtime_maps_to_processing_error() {
        let err = EventHandlerError::from(QueueError::NoRuntime);

        assert!(matches!(err, EventHandlerError::ProcessingError(ref m) if m.contains("runtime")));
    }

    #[test]
    fn test_boxed_handler_error_is_recovered() {
        let boxed = courier_queue::BoxError::from(EventHandlerError::failed("smtp down"));
        let err = EventHandlerError::from(QueueError::ExecutionFailed(boxed));

        assert!(matches!(err, EventHandlerError::HandlerFailed(ref m) if m == "smtp down"));
    }

    #[test]
    fn test_foreign_error_becomes_handler_failed() {
        let err = EventHandlerError::from(QueueError::ExecutionFailed("io".into()));
        assert!(matches!(err, EventHandlerError::HandlerFailed(ref m) if m == "io"));
    }

    #[test]
    fn test_queue_error_mapping() {
        assert!(EventHandlerError::from(QueueError::Timeout(Duration::from_secs(2))).is_timeout());
        assert!(matches!(
            EventHandlerError::from(QueueError::NotConfigured),
            EventHandlerError::QueueNotConfigured
        ));
        assert!(matches!(
            EventHandlerError::from(QueueError::Panicked("boom".into())),
            EventHandlerError::Panicked(_)
        ));
    }
}
