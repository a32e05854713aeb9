use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Boxed error type returned by task handlers.
///
/// Handlers are ordinary application code and may return any error; the
/// engine only distinguishes the sentinel [`RetryRequested`] and the
/// structured [`TaskFailure`] by downcasting.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Sentinel error a handler returns to request a retry regardless of the
/// descriptor's `retry_on_any_error` flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryRequested;

impl fmt::Display for RetryRequested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry requested")
    }
}

impl std::error::Error for RetryRequested {}

/// Returns `true` if `err` is (or wraps) [`RetryRequested`].
pub fn is_retry_requested(err: &HandlerError) -> bool {
    err.downcast_ref::<RetryRequested>().is_some()
}

/// The persisted form of a handler error: a message plus free-form
/// metadata, matching the reference implementation's `task.Error` type
/// (`Message` + `Metadata`). Handlers that want structured context return
/// this directly instead of a plain string error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Build a [`TaskFailure`] from any handler error: if `err` is itself
    /// a [`TaskFailure`], its metadata is preserved; otherwise the
    /// failure carries only `err`'s `Display` message.
    pub fn from_handler_error(err: &HandlerError) -> Self {
        match err.downcast_ref::<TaskFailure>() {
            Some(failure) => failure.clone(),
            None => TaskFailure::new(err.to_string()),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_requested_is_detected_through_the_box() {
        let err: HandlerError = Box::new(RetryRequested);
        assert!(is_retry_requested(&err));
    }

    #[test]
    fn unrelated_error_is_not_retry_requested() {
        let err: HandlerError = Box::new(TaskFailure::new("boom"));
        assert!(!is_retry_requested(&err));
    }

    #[test]
    fn from_handler_error_preserves_metadata() {
        let failure = TaskFailure::new("disk full").with_metadata("device", "/dev/sda1");
        let err: HandlerError = Box::new(failure.clone());
        assert_eq!(TaskFailure::from_handler_error(&err), failure);
    }

    #[test]
    fn from_handler_error_wraps_plain_errors() {
        let err: HandlerError = "plain string error".into();
        let failure = TaskFailure::from_handler_error(&err);
        assert_eq!(failure.message, "plain string error");
        assert!(failure.metadata.is_empty());
    }
}
