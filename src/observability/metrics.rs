//! Metrics collection for the recommendation client.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::ErrorKind;

/// Metrics collector interface.
pub trait MetricsCollector: Send + Sync {
    /// Records one transport attempt.
    fn record_attempt(&self);

    /// Records a scheduled retry and its delay.
    fn record_retry(&self, delay: Duration);

    /// Records a successful operation.
    fn record_success(&self, duration: Duration);

    /// Records a terminal failure.
    fn record_failure(&self, kind: ErrorKind, duration: Duration);

    /// Gets current metrics.
    fn snapshot(&self) -> ClientMetrics;

    /// Resets all metrics.
    fn reset(&self);
}

/// Client metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientMetrics {
    /// Logical operations that reached a terminal state.
    pub operations: u64,
    /// Transport attempts, retries included.
    pub attempts: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Successful operations.
    pub successes: u64,
    /// Failed operations, cancellations and circuit rejections included.
    pub failures: u64,
    /// Total time spent waiting between retries, in milliseconds.
    pub retry_wait_ms: u64,
    /// Total operation latency in milliseconds.
    pub total_latency_ms: u64,
    /// Terminal failures by error kind.
    pub errors: HashMap<ErrorKind, u64>,
}

impl ClientMetrics {
    /// Calculates average operation latency in milliseconds.
    pub fn average_latency_ms(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.operations as f64
        }
    }

    /// Calculates success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.operations == 0 {
            100.0
        } else {
            (self.successes as f64 / self.operations as f64) * 100.0
        }
    }

    /// Returns the number of terminal failures of one kind.
    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
}

/// Default metrics collector implementation.
#[derive(Debug, Default)]
pub struct DefaultMetricsCollector {
    operations: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retry_wait_ms: AtomicU64,
    total_latency_ms: AtomicU64,
    errors: RwLock<HashMap<ErrorKind, u64>>,
}

impl DefaultMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self, delay: Duration) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.retry_wait_ms
            .fetch_add(millis(delay), Ordering::Relaxed);
    }

    fn record_success(&self, duration: Duration) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(millis(duration), Ordering::Relaxed);
    }

    fn record_failure(&self, kind: ErrorKind, duration: Duration) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(millis(duration), Ordering::Relaxed);
        *self.errors.write().entry(kind).or_insert(0) += 1;
    }

    fn snapshot(&self) -> ClientMetrics {
        ClientMetrics {
            operations: self.operations.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retry_wait_ms: self.retry_wait_ms.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            errors: self.errors.read().clone(),
        }
    }

    fn reset(&self) {
        self.operations.store(0, Ordering::Relaxed);
        self.attempts.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.retry_wait_ms.store(0, Ordering::Relaxed);
        self.total_latency_ms.store(0, Ordering::Relaxed);
        self.errors.write().clear();
    }
}

/// Metrics collector that records nothing.
#[derive(Debug, Default)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_attempt(&self) {}

    fn record_retry(&self, _delay: Duration) {}

    fn record_success(&self, _duration: Duration) {}

    fn record_failure(&self, _kind: ErrorKind, _duration: Duration) {}

    fn snapshot(&self) -> ClientMetrics {
        ClientMetrics::default()
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collector_counts() {
        let collector = DefaultMetricsCollector::new();

        collector.record_attempt();
        collector.record_attempt();
        collector.record_retry(Duration::from_millis(100));
        collector.record_success(Duration::from_millis(150));
        collector.record_attempt();
        collector.record_failure(ErrorKind::Auth, Duration::from_millis(50));

        let metrics = collector.snapshot();
        assert_eq!(metrics.operations, 2);
        assert_eq!(metrics.attempts, 3);
        assert_eq!(metrics.retries, 1);
        assert_eq!(metrics.retry_wait_ms, 100);
        assert_eq!(metrics.errors_of(ErrorKind::Auth), 1);
        assert_eq!(metrics.errors_of(ErrorKind::Server), 0);
        assert_eq!(metrics.average_latency_ms(), 100.0);
        assert_eq!(metrics.success_rate(), 50.0);
    }

    #[test]
    fn test_reset() {
        let collector = DefaultMetricsCollector::new();
        collector.record_attempt();
        collector.record_failure(ErrorKind::Network, Duration::from_millis(10));

        collector.reset();
        assert_eq!(collector.snapshot(), ClientMetrics::default());
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = ClientMetrics::default();
        assert_eq!(metrics.average_latency_ms(), 0.0);
        assert_eq!(metrics.success_rate(), 100.0);
    }
}
