use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use relio_task::Descriptor;

use crate::manager::Manager;

/// Republishes retries, children, and link-error tasks produced by the
/// Executor stage via `manager.submit`, retrying indefinitely on failure.
///
/// Has no stop signal of its own: by the time shutdown reaches this
/// stage every producer into `rx` has already exited, so `rx.recv()`
/// drains whatever remains and returns `None` once the channel closes.
/// If the transport stays down, shutdown blocks here until it recovers --
/// that is intentional, since these descriptors have no underlying
/// delivery to fall back on if dropped.
pub(crate) async fn run(mut rx: mpsc::Receiver<Descriptor>, manager: Arc<Manager>, backoff: Duration) {
    while let Some(descriptor) = rx.recv().await {
        let id = descriptor.id.clone();
        loop {
            match manager.submit(descriptor.clone()).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(task_id = %id, error = %e, "sender stage: publish failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
