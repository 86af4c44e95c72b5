use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine-wide counters, updated lock-free from the dispatch path.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    requests_completed: AtomicU64,
    requests_rejected: AtomicU64,
    invocations: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    gate_failures: AtomicU64,
    degradations: AtomicU64,
    cancellations: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests that ran to a verdict.
    pub requests_completed: u64,
    /// Requests rejected up-front (policy, decomposition, confidence).
    pub requests_rejected: u64,
    /// Capability invocations attempted.
    pub invocations: u64,
    /// Invocation attempts beyond the first per task.
    pub retries: u64,
    /// Invocations that hit the per-invocation timeout.
    pub timeouts: u64,
    /// Required gates that reported failure.
    pub gate_failures: u64,
    /// Degradation transitions taken.
    pub degradations: u64,
    /// Requests cancelled by their caller.
    pub cancellations: u64,
}

impl EngineMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_completed(&self) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn gate_failure(&self) {
        self.gate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn degradation(&self) {
        self.degradations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            gate_failures: self.gate_failures.load(Ordering::Relaxed),
            degradations: self.degradations.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.invocation();
        metrics.invocation();
        metrics.retry();
        metrics.timeout();

        let snap = metrics.snapshot();
        assert_eq!(snap.invocations, 2);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.requests_completed, 0);
    }
}
