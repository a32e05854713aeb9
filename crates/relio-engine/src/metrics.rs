use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for submitted and completed tasks.
///
/// Backed by atomics rather than a single owning goroutine/task: `submit`
/// can legitimately be called concurrently by application code and by the
/// engine's own Sender stage (republishing retries, children, and
/// link-error tasks), so every increment needs to be race-free on its own.
#[derive(Debug, Default)]
pub struct Metrics {
    sent: AtomicU64,
    done_success: AtomicU64,
    done_error: AtomicU64,
}

/// A point-in-time read of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub task_sent: u64,
    pub task_done_success: u64,
    pub task_done_error: u64,
}

impl Metrics {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_done_success(&self) {
        self.done_success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_done_error(&self) {
        self.done_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            task_sent: self.sent.load(Ordering::Relaxed),
            task_done_success: self.done_success.load(Ordering::Relaxed),
            task_done_error: self.done_error.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = Metrics::default();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counters_accumulate_independently() {
        let metrics = Metrics::default();
        metrics.record_sent();
        metrics.record_sent();
        metrics.record_done_success();
        metrics.record_done_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.task_sent, 2);
        assert_eq!(snapshot.task_done_success, 1);
        assert_eq!(snapshot.task_done_error, 1);
    }
}
