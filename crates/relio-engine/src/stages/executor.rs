use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use relio_task::{is_retry_requested, Descriptor, HandlerError, TaskError, TaskFailure};

use crate::handler::HandlerRegistry;
use crate::metrics::Metrics;

/// Runs handlers for incoming descriptors, bounded by `semaphore` when the
/// transport advertises a positive concurrency limit.
///
/// On `stop`, no new descriptor is admitted (one already queued on a
/// handoff into this stage, or blocked acquiring a permit, is simply
/// dropped and redelivered later); every handler already spawned is
/// allowed to finish -- this is a cooperative drain, not an abort.
pub(crate) async fn run(
    mut rx: mpsc::Receiver<Descriptor>,
    tx_send: mpsc::Sender<Descriptor>,
    tx_done: mpsc::Sender<Descriptor>,
    stop: CancellationToken,
    registry: Arc<RwLock<HandlerRegistry>>,
    metrics: Arc<Metrics>,
    semaphore: Option<Arc<Semaphore>>,
) {
    let mut in_flight: JoinSet<()> = JoinSet::new();

    'admit: loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break 'admit,
            _ = in_flight.join_next(), if !in_flight.is_empty() => {}
            maybe = rx.recv() => {
                let Some(descriptor) = maybe else { break 'admit };

                let permit = if let Some(sem) = &semaphore {
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break 'admit,
                        acquired = Arc::clone(sem).acquire_owned() => {
                            Some(acquired.expect("executor semaphore is never closed"))
                        }
                    }
                } else {
                    None
                };

                let registry = Arc::clone(&registry);
                let metrics = Arc::clone(&metrics);
                let tx_send = tx_send.clone();
                let tx_done = tx_done.clone();

                in_flight.spawn(async move {
                    let _permit = permit;
                    execute_one(descriptor, &registry, &metrics, &tx_send, &tx_done).await;
                });
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
}

async fn execute_one(
    mut descriptor: Descriptor,
    registry: &RwLock<HandlerRegistry>,
    metrics: &Metrics,
    tx_send: &mpsc::Sender<Descriptor>,
    tx_done: &mpsc::Sender<Descriptor>,
) {
    let handler = registry.read().await.get(&descriptor.name);
    let Some(handler) = handler else {
        let err = TaskError::HandlerNotRegistered(descriptor.name.clone());
        tracing::error!(
            task_id = %descriptor.id,
            name = %descriptor.name,
            %err,
            "dropping task, transport will redeliver"
        );
        return;
    };

    descriptor.executed_at = Some(Utc::now());
    descriptor.current_try += 1;

    let run_descriptor = descriptor.clone();
    let join = tokio::spawn(async move { handler.handle(&run_descriptor).await });

    let outcome: Result<(), HandlerError> = match join.await {
        Ok(result) => result,
        Err(join_err) => Err(Box::new(TaskFailure::new(panic_message(join_err)))),
    };

    descriptor.done_at = Some(Utc::now());

    match outcome {
        Ok(()) => {
            for child in std::mem::take(&mut descriptor.children) {
                let mut child = child;
                child.parent = Some(Box::new(descriptor.snapshot()));
                if tx_send.send(child).await.is_err() {
                    tracing::warn!(task_id = %descriptor.id, "sender stage gone, dropping child task");
                }
            }
            metrics.record_done_success();
        }
        Err(err) => handle_task_error(&mut descriptor, err, metrics, tx_send).await,
    }

    if tx_done.send(descriptor).await.is_err() {
        tracing::warn!("acker stage gone, done descriptor dropped");
    }
}

async fn handle_task_error(
    descriptor: &mut Descriptor,
    err: HandlerError,
    metrics: &Metrics,
    tx_send: &mpsc::Sender<Descriptor>,
) {
    let wants_retry = is_retry_requested(&err) || descriptor.retry_on_any_error;
    descriptor.last_error = Some(TaskFailure::from_handler_error(&err));

    if wants_retry && descriptor.retries_remaining() {
        let mut retry = descriptor.clone();
        let delay = retry.retry_policy.delay_for(retry.current_try);
        retry.eta = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        if tx_send.send(retry).await.is_err() {
            tracing::warn!(task_id = %descriptor.id, "sender stage gone, dropping retry task");
        }
        return;
    }

    metrics.record_done_error();
    if let Some(link) = descriptor.link_error.take() {
        let mut link_clone = *link;
        link_clone.parent = Some(Box::new(descriptor.snapshot()));
        if tx_send.send(link_clone).await.is_err() {
            tracing::warn!(task_id = %descriptor.id, "sender stage gone, dropping link-error task");
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "handler panicked".to_string()
            }
        }
        Err(join_err) => format!("handler task did not complete: {join_err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relio_task::{create_descriptor, RetryRequested};
    use tokio::sync::RwLock as TokioRwLock;

    use crate::handler::Handler;

    struct AlwaysOk;
    #[async_trait]
    impl Handler for AlwaysOk {
        async fn handle(&self, _descriptor: &Descriptor) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct AlwaysPanics;
    #[async_trait]
    impl Handler for AlwaysPanics {
        async fn handle(&self, _descriptor: &Descriptor) -> Result<(), HandlerError> {
            panic!("boom");
        }
    }

    struct RetryThenOk;
    #[async_trait]
    impl Handler for RetryThenOk {
        async fn handle(&self, descriptor: &Descriptor) -> Result<(), HandlerError> {
            if descriptor.current_try < 3 {
                Err(Box::new(RetryRequested))
            } else {
                Ok(())
            }
        }
    }

    async fn registry_with(name: &str, handler: impl Handler + 'static) -> Arc<TokioRwLock<HandlerRegistry>> {
        let mut registry = HandlerRegistry::new();
        registry.register(name, handler).unwrap();
        Arc::new(TokioRwLock::new(registry))
    }

    #[tokio::test]
    async fn success_path_acks_and_forwards_children() {
        let registry = registry_with("noop", AlwaysOk).await;
        let metrics = Arc::new(Metrics::default());
        let (tx_send, mut rx_send) = mpsc::channel(4);
        let (tx_done, mut rx_done) = mpsc::channel(4);

        let child = create_descriptor("child", Vec::new());
        let descriptor = create_descriptor("noop", Vec::new()).add_child(child);

        execute_one(descriptor, &registry, &metrics, &tx_send, &tx_done).await;

        let forwarded_child = rx_send.try_recv().unwrap();
        assert_eq!(forwarded_child.name, "child");
        assert!(forwarded_child.parent.is_some());

        let done = rx_done.try_recv().unwrap();
        assert_eq!(done.name, "noop");
        assert_eq!(metrics.snapshot().task_done_success, 1);
    }

    #[tokio::test]
    async fn retry_requested_reschedules_without_incrementing_error_metric() {
        let registry = registry_with("retry_then_ok", RetryThenOk).await;
        let metrics = Arc::new(Metrics::default());
        let (tx_send, mut rx_send) = mpsc::channel(4);
        let (tx_done, mut rx_done) = mpsc::channel(4);

        let descriptor = create_descriptor("retry_then_ok", Vec::new()).set_max_retry(-1);
        execute_one(descriptor, &registry, &metrics, &tx_send, &tx_done).await;

        let retried = rx_send.try_recv().unwrap();
        assert_eq!(retried.current_try, 1);
        assert_eq!(metrics.snapshot().task_done_error, 0);

        let done = rx_done.try_recv().unwrap();
        assert_eq!(done.current_try, 1);
    }

    #[tokio::test]
    async fn panic_is_converted_into_a_done_error_with_the_panic_message() {
        let registry = registry_with("boom", AlwaysPanics).await;
        let metrics = Arc::new(Metrics::default());
        let (tx_send, mut rx_send) = mpsc::channel(4);
        let (tx_done, mut rx_done) = mpsc::channel(4);

        let descriptor = create_descriptor("boom", Vec::new());
        execute_one(descriptor, &registry, &metrics, &tx_send, &tx_done).await;

        assert!(rx_send.try_recv().is_err());
        let done = rx_done.try_recv().unwrap();
        assert_eq!(done.last_error.unwrap().message, "boom");
        assert_eq!(metrics.snapshot().task_done_error, 1);
    }

    #[tokio::test]
    async fn missing_handler_is_dropped_without_acking() {
        let registry = Arc::new(TokioRwLock::new(HandlerRegistry::new()));
        let metrics = Arc::new(Metrics::default());
        let (tx_send, mut rx_send) = mpsc::channel(4);
        let (tx_done, mut rx_done) = mpsc::channel(4);

        let descriptor = create_descriptor("ghost", Vec::new());
        execute_one(descriptor, &registry, &metrics, &tx_send, &tx_done).await;

        assert!(rx_send.try_recv().is_err());
        assert!(rx_done.try_recv().is_err());
        assert_eq!(metrics.snapshot().task_done_error, 0);
    }
}
