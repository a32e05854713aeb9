//! The `Transport` contract: the narrow interface every queue backend
//! (broker client, in-process channel, ...) must satisfy so the worker
//! engine can consume, publish, and acknowledge descriptors without
//! knowing anything about the backend's internals.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relio_task::Descriptor;

/// Errors a [`Transport`] implementation can surface to the engine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("consume failed: {0}")]
    ConsumeFailed(String),
    #[error("ack failed: {0}")]
    AckFailed(String),
    #[error("channel unavailable")]
    ChannelUnavailable,
}

/// The external contract every queue backend implements.
///
/// A `Transport` owns whatever state it needs to map a delivered
/// [`Descriptor`]'s `running_id` back to the underlying delivery so it can
/// ack that specific delivery later; the engine never touches delivery
/// tags directly.
///
/// # Object safety
///
/// This trait is object-safe, so the engine stores it as
/// `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepare the backend. May begin asynchronous reconnection on
    /// failure but must return `Ok(())` in that case so the caller stays
    /// usable; only truly unrecoverable setup errors should be returned.
    async fn init(&self) -> Result<(), TransportError>;

    /// Serialize and enqueue `descriptor`. Transient errors are retried
    /// by the engine's Sender stage, not here.
    async fn publish(&self, descriptor: Descriptor) -> Result<(), TransportError>;

    /// Advisory worker parallelism for the engine's Executor stage.
    /// `0` (or negative) means "no in-engine cap".
    fn concurrency(&self) -> i64;

    /// Push consumed descriptors into `out` until `stop` is cancelled or
    /// the transport's own source closes. Must track which delivery
    /// corresponds to each emitted `running_id` for later acking.
    async fn consume_into(
        &self,
        out: mpsc::Sender<Descriptor>,
        stop: CancellationToken,
    ) -> Result<(), TransportError>;

    /// Consume `done` and ack each descriptor's underlying delivery.
    /// Must return once `done` is closed (all senders dropped).
    async fn ack_loop(&self, done: mpsc::Receiver<Descriptor>);

    /// Release all resources held by this transport.
    async fn stop(&self) -> Result<(), TransportError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Transport) {}
};
