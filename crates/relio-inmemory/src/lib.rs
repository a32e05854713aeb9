//! A [`Transport`] backed entirely by in-process `tokio::sync::mpsc`
//! channels: no broker, no network, no persistence across restarts.
//!
//! This exists for tests and the demo binary, as a minimal but complete
//! reference implementation of the contract every real backend has to
//! satisfy: it tracks which delivered `running_id`s are still unacked the
//! same way a broker-backed transport would track delivery tags.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use relio_task::Descriptor;
use relio_transport::{Transport, TransportError};

/// An in-memory [`Transport`]. Cheaply clonable via `Arc` sharing; queue
/// and in-flight state live behind the same handle regardless of how many
/// `Arc` clones exist.
pub struct InMemoryTransport {
    queue_tx: mpsc::UnboundedSender<Descriptor>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Descriptor>>>,
    in_flight: Mutex<HashMap<String, Descriptor>>,
    concurrency: i64,
}

impl InMemoryTransport {
    /// An unbounded-concurrency transport (`concurrency() == 0`, i.e. the
    /// Executor stage applies no semaphore cap).
    pub fn new() -> Arc<Self> {
        Self::with_concurrency(0)
    }

    pub fn with_concurrency(concurrency: i64) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            in_flight: Mutex::new(HashMap::new()),
            concurrency,
        })
    }

    /// Enqueue a descriptor directly, bypassing `Manager::submit`. Useful
    /// for tests that want to seed the queue before the worker starts.
    pub fn enqueue(&self, descriptor: Descriptor) -> Result<(), TransportError> {
        self.queue_tx
            .send(descriptor)
            .map_err(|_| TransportError::ChannelUnavailable)
    }

    /// How many descriptors have been delivered to a consumer but not yet
    /// acked.
    pub async fn pending_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn init(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish(&self, descriptor: Descriptor) -> Result<(), TransportError> {
        self.enqueue(descriptor)
    }

    fn concurrency(&self) -> i64 {
        self.concurrency
    }

    async fn consume_into(
        &self,
        out: mpsc::Sender<Descriptor>,
        stop: CancellationToken,
    ) -> Result<(), TransportError> {
        let mut guard = self.queue_rx.lock().await;
        let mut rx = guard.take().ok_or(TransportError::ChannelUnavailable)?;

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                maybe = rx.recv() => {
                    match maybe {
                        None => break,
                        Some(descriptor) => {
                            self.in_flight
                                .lock()
                                .await
                                .insert(descriptor.running_id.clone(), descriptor.clone());
                            if out.send(descriptor).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        *guard = Some(rx);
        Ok(())
    }

    async fn ack_loop(&self, mut done: mpsc::Receiver<Descriptor>) {
        while let Some(descriptor) = done.recv().await {
            if self
                .in_flight
                .lock()
                .await
                .remove(&descriptor.running_id)
                .is_none()
            {
                tracing::warn!(
                    running_id = %descriptor.running_id,
                    "acked a running_id with no tracked delivery"
                );
            }
        }
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
