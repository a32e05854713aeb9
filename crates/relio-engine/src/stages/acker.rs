use std::sync::Arc;

use tokio::sync::mpsc;

use relio_task::Descriptor;
use relio_transport::Transport;

/// Hands completed descriptors to the transport's own ack loop. Returns
/// once `done` closes, which `Manager::stop_worker` triggers by dropping
/// its sender after every earlier stage has exited.
pub(crate) async fn run(transport: Arc<dyn Transport>, done: mpsc::Receiver<Descriptor>) {
    transport.ack_loop(done).await;
}
