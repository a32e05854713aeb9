use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relio_task::{IdGenerator, RandomIdGenerator};
use relio_transport::Transport;

use crate::error::ManagerError;
use crate::handler::{Handler, HandlerRegistry};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::stages;

/// Tunables for a [`Manager`]'s worker loop.
pub struct ManagerConfig {
    /// Delay between publish retries in the Sender stage, matching the
    /// reference implementation's one-second default.
    pub sender_retry_backoff: Duration,
    /// Source of `id`/`running_id` values. Pluggable because ID generation
    /// is explicitly an external collaborator, not an engine concern.
    pub id_generator: Arc<dyn IdGenerator>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sender_retry_backoff: Duration::from_secs(1),
            id_generator: Arc::new(RandomIdGenerator),
        }
    }
}

impl ManagerConfig {
    /// Reads `RELIO_SENDER_RETRY_BACKOFF` (a `humantime`-parseable duration
    /// such as `"500ms"` or `"2s"`), falling back to the one-second default
    /// when unset or unparseable. `id_generator` is not environment
    /// configurable; inject it through [`ManagerConfig`] directly.
    pub fn from_env() -> Self {
        let sender_retry_backoff = std::env::var("RELIO_SENDER_RETRY_BACKOFF")
            .ok()
            .and_then(|raw| humantime::parse_duration(&raw).ok())
            .unwrap_or(Duration::from_secs(1));
        Self {
            sender_retry_backoff,
            ..Default::default()
        }
    }
}

/// State for a single in-progress `run_worker` call, torn down by
/// `stop_worker` one stage at a time, upstream first.
struct RunningWorker {
    stop_provider: CancellationToken,
    stop_scheduler: CancellationToken,
    stop_executor: CancellationToken,
    provider_handle: JoinHandle<()>,
    scheduler_handle: JoinHandle<()>,
    executor_handle: JoinHandle<()>,
    sender_handle: JoinHandle<()>,
    acker_handle: JoinHandle<()>,
    done_tx: mpsc::Sender<relio_task::Descriptor>,
    completed: Arc<Notify>,
}

/// Owns the handler registry, the transport, and the worker engine built
/// on top of it.
///
/// A `Manager` is meant to be shared via `Arc`: `submit` and
/// `register_handler` are safe to call from any task, and `run_worker`
/// spawns the five-stage pipeline (Provider, Scheduler, Executor, Sender,
/// Acker) without blocking callers that only want to submit work.
pub struct Manager {
    transport: Arc<dyn Transport>,
    registry: Arc<RwLock<HandlerRegistry>>,
    frozen: AtomicBool,
    metrics: Arc<Metrics>,
    config: ManagerConfig,
    running: AsyncMutex<Option<RunningWorker>>,
}

impl Manager {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_config(transport, ManagerConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            registry: Arc::new(RwLock::new(HandlerRegistry::new())),
            frozen: AtomicBool::new(false),
            metrics: Arc::new(Metrics::default()),
            config,
            running: AsyncMutex::new(None),
        })
    }

    /// Register a handler under `name`. Rejected with
    /// [`ManagerError::WorkerAlreadyRunning`] once `run_worker` has been
    /// called: the registry is frozen at that point so the Executor stage
    /// never races a concurrent writer.
    pub async fn register_handler(
        &self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<(), ManagerError> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(ManagerError::WorkerAlreadyRunning);
        }
        let mut registry = self.registry.write().await;
        registry.register(name, handler)?;
        Ok(())
    }

    /// Names of every registered handler.
    pub async fn handled(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// Stamp `descriptor` with a fresh `running_id` and queue timestamp,
    /// record `TaskSent`, and hand it to the transport.
    pub async fn submit(&self, mut descriptor: relio_task::Descriptor) -> Result<(), ManagerError> {
        descriptor.running_id = self.config.id_generator.generate();
        descriptor.queued_at = Some(Utc::now());
        self.metrics.record_sent();
        self.transport.publish(descriptor).await?;
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Start the five-stage pipeline and block until `stop_worker` (called
    /// directly, or indirectly via SIGINT/SIGTERM) completes the shutdown
    /// sequence.
    ///
    /// Returns [`ManagerError::WorkerAlreadyRunning`] immediately if a
    /// worker is already running on this `Manager`; otherwise this call is
    /// idempotent in the sense that it always returns only after a full,
    /// ordered shutdown.
    pub async fn run_worker(self: &Arc<Self>) -> Result<(), ManagerError> {
        let mut guard = self.running.lock().await;
        if guard.is_some() {
            return Err(ManagerError::WorkerAlreadyRunning);
        }
        self.frozen.store(true, Ordering::Release);

        self.transport.init().await?;

        let (to_run_tx, to_run_rx) = mpsc::channel(1);
        let (to_process_tx, to_process_rx) = mpsc::channel(1);
        let (to_send_tx, to_send_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);

        let stop_provider = CancellationToken::new();
        let stop_scheduler = CancellationToken::new();
        let stop_executor = CancellationToken::new();

        let semaphore = {
            let concurrency = self.transport.concurrency();
            if concurrency > 0 {
                Some(Arc::new(Semaphore::new(concurrency as usize)))
            } else {
                None
            }
        };

        let provider_handle = tokio::spawn(stages::provider::run(
            Arc::clone(&self.transport),
            to_run_tx,
            stop_provider.clone(),
        ));

        let scheduler_handle = tokio::spawn(stages::scheduler::run(
            to_run_rx,
            to_process_tx,
            stop_scheduler.clone(),
        ));

        let executor_handle = tokio::spawn(stages::executor::run(
            to_process_rx,
            to_send_tx.clone(),
            done_tx.clone(),
            stop_executor.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            semaphore,
        ));
        drop(to_send_tx);

        let sender_handle = tokio::spawn(stages::sender::run(
            to_send_rx,
            Arc::clone(self),
            self.config.sender_retry_backoff,
        ));

        let acker_handle = tokio::spawn(stages::acker::run(Arc::clone(&self.transport), done_rx));

        let completed = Arc::new(Notify::new());

        *guard = Some(RunningWorker {
            stop_provider,
            stop_scheduler,
            stop_executor,
            provider_handle,
            scheduler_handle,
            executor_handle,
            sender_handle,
            acker_handle,
            done_tx,
            completed: Arc::clone(&completed),
        });
        drop(guard);

        let signal_watch = Arc::clone(self);
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, stopping worker");
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, stopping worker");
                }
            }
            signal_watch.stop_worker().await;
        });

        completed.notified().await;
        Ok(())
    }

    /// Idempotently tear down a running worker, upstream first: Provider,
    /// then Scheduler, then Executor (each awaited before the next is
    /// signalled), then the Sender drains naturally, then the done channel
    /// is closed for the Acker, then the transport itself is released.
    ///
    /// A no-op if no worker is running.
    pub async fn stop_worker(&self) {
        let mut guard = self.running.lock().await;
        let Some(running) = guard.take() else {
            return;
        };
        drop(guard);

        running.stop_provider.cancel();
        let _ = running.provider_handle.await;

        running.stop_scheduler.cancel();
        let _ = running.scheduler_handle.await;

        running.stop_executor.cancel();
        let _ = running.executor_handle.await;

        // The Sender has no stop signal of its own: by now every producer
        // into its inbound channel has exited, so it drains whatever is
        // buffered and returns once the channel closes. If the transport
        // is down it blocks here retrying rather than dropping the work.
        let _ = running.sender_handle.await;

        drop(running.done_tx);
        let _ = running.acker_handle.await;

        if let Err(e) = self.transport.stop().await {
            tracing::warn!(error = %e, "transport reported an error while stopping");
        }

        running.completed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relio_task::{create_descriptor, Descriptor, HandlerError};
    use relio_transport::TransportError;
    use std::sync::atomic::AtomicUsize;
    use tokio_util::sync::CancellationToken as CT;

    struct NoopTransport {
        concurrency: i64,
    }

    #[async_trait]
    impl Transport for NoopTransport {
        async fn init(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn publish(&self, _descriptor: Descriptor) -> Result<(), TransportError> {
            Ok(())
        }
        fn concurrency(&self) -> i64 {
            self.concurrency
        }
        async fn consume_into(
            &self,
            _out: mpsc::Sender<Descriptor>,
            stop: CT,
        ) -> Result<(), TransportError> {
            stop.cancelled().await;
            Ok(())
        }
        async fn ack_loop(&self, mut done: mpsc::Receiver<Descriptor>) {
            while done.recv().await.is_some() {}
        }
        async fn stop(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for Counting {
        async fn handle(&self, _descriptor: &Descriptor) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_handler_rejects_duplicate() {
        let manager = Manager::new(Arc::new(NoopTransport { concurrency: 0 }));
        let calls = Arc::new(AtomicUsize::new(0));
        manager
            .register_handler("noop", Counting(Arc::clone(&calls)))
            .await
            .unwrap();
        let err = manager
            .register_handler("noop", Counting(calls))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Task(relio_task::TaskError::DuplicateHandler(_))
        ));
    }

    #[tokio::test]
    async fn submit_stamps_running_id_and_records_metric() {
        let manager = Manager::new(Arc::new(NoopTransport { concurrency: 0 }));
        assert_eq!(manager.metrics_snapshot().task_sent, 0);
        manager
            .submit(create_descriptor("noop", Vec::new()))
            .await
            .unwrap();
        assert_eq!(manager.metrics_snapshot().task_sent, 1);
    }

    #[tokio::test]
    async fn run_worker_rejects_second_call_while_running() {
        let manager = Manager::new(Arc::new(NoopTransport { concurrency: 0 }));
        let m2 = Arc::clone(&manager);
        let handle = tokio::spawn(async move { m2.run_worker().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = manager.run_worker().await.unwrap_err();
        assert!(matches!(err, ManagerError::WorkerAlreadyRunning));

        manager.stop_worker().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn register_handler_after_start_is_rejected() {
        let manager = Manager::new(Arc::new(NoopTransport { concurrency: 0 }));
        let m2 = Arc::clone(&manager);
        let handle = tokio::spawn(async move { m2.run_worker().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let err = manager
            .register_handler("late", Counting(calls))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::WorkerAlreadyRunning));

        manager.stop_worker().await;
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_worker_is_idempotent_when_nothing_is_running() {
        let manager = Manager::new(Arc::new(NoopTransport { concurrency: 0 }));
        manager.stop_worker().await;
        manager.stop_worker().await;
    }

    // Mutex to serialize tests that modify environment variables.
    static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn config_from_env_falls_back_to_default_when_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by mutex, test-only code.
        unsafe { std::env::remove_var("RELIO_SENDER_RETRY_BACKOFF") };
        let config = ManagerConfig::from_env();
        assert_eq!(config.sender_retry_backoff, Duration::from_secs(1));
    }

    #[test]
    fn config_from_env_parses_a_humantime_duration() {
        let _lock = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by mutex, test-only code.
        unsafe { std::env::set_var("RELIO_SENDER_RETRY_BACKOFF", "250ms") };
        let config = ManagerConfig::from_env();
        unsafe { std::env::remove_var("RELIO_SENDER_RETRY_BACKOFF") };
        assert_eq!(config.sender_retry_backoff, Duration::from_millis(250));
    }
}
