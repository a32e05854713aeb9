use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relio_task::Descriptor;
use relio_transport::Transport;

/// Forwards whatever the transport consumes into `tx` until `stop` fires
/// or the transport's own source closes.
pub(crate) async fn run(
    transport: Arc<dyn Transport>,
    tx: mpsc::Sender<Descriptor>,
    stop: CancellationToken,
) {
    if let Err(e) = transport.consume_into(tx, stop).await {
        tracing::error!(error = %e, "provider stage: transport consume_into failed");
    }
}
