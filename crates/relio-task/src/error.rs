use thiserror::Error;

/// Configuration-class errors surfaced synchronously to callers, per the
/// error taxonomy: handler registration and lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("handler {0:?} is already registered")]
    DuplicateHandler(String),
    #[error("no handler registered for task name {0:?}")]
    HandlerNotRegistered(String),
}
