use thiserror::Error;

use relio_task::TaskError;
use relio_transport::TransportError;

/// Errors surfaced from the [`crate::Manager`]'s synchronous API.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `run_worker` was called while a worker is already running, or
    /// `register_handler` was called after one had started (the registry
    /// is frozen the moment a worker starts).
    #[error("worker is already running")]
    WorkerAlreadyRunning,
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
