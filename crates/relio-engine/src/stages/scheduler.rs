use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use relio_task::Descriptor;

/// Forwards eligible descriptors (I3: `now >= eta`) straight through to
/// `tx`; descriptors not yet eligible are parked on their own timer task
/// and forwarded once their `eta` arrives.
///
/// On `stop`, any descriptor currently blocked on a handoff into `tx` is
/// dropped rather than forced through: it was never acked, so the
/// transport will redeliver it. Timers armed but not yet fired are
/// dropped along with the `JoinSet` that owns them.
pub(crate) async fn run(
    mut rx: mpsc::Receiver<Descriptor>,
    tx: mpsc::Sender<Descriptor>,
    stop: CancellationToken,
) {
    let mut timers: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = timers.join_next(), if !timers.is_empty() => {}
            maybe = rx.recv() => {
                match maybe {
                    None => break,
                    Some(descriptor) => {
                        let now = Utc::now();
                        if descriptor.is_eligible(now) {
                            tokio::select! {
                                biased;
                                _ = stop.cancelled() => break,
                                res = tx.send(descriptor) => {
                                    if res.is_err() {
                                        break;
                                    }
                                }
                            }
                        } else {
                            let wait = (descriptor.eta - now)
                                .to_std()
                                .unwrap_or(std::time::Duration::ZERO);
                            let tx_timer = tx.clone();
                            timers.spawn(async move {
                                tokio::time::sleep(wait).await;
                                let _ = tx_timer.send(descriptor).await;
                            });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relio_task::create_descriptor;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn eligible_descriptor_passes_through_immediately() {
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let handle = tokio::spawn(run(in_rx, out_tx, stop.clone()));
        in_tx
            .send(create_descriptor("noop", Vec::new()))
            .await
            .unwrap();

        let received = tokio::time::timeout(StdDuration::from_millis(200), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.name, "noop");

        stop.cancel();
        drop(in_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn future_eta_is_delayed_until_due() {
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let handle = tokio::spawn(run(in_rx, out_tx, stop.clone()));
        let descriptor =
            create_descriptor("noop", Vec::new()).set_eta(Utc::now() + chrono::Duration::milliseconds(80));
        in_tx.send(descriptor).await.unwrap();

        assert!(out_rx.try_recv().is_err());
        let received = tokio::time::timeout(StdDuration::from_millis(500), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.name, "noop");

        stop.cancel();
        drop(in_tx);
        handle.await.unwrap();
    }
}
