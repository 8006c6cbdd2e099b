//! Circuit breaker implementation.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is testing, one trial request allowed.
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// When false every check passes and outcomes are ignored.
    pub enabled: bool,
    /// Number of consecutive failures before opening.
    pub failure_threshold: u32,
    /// Upper bound on a single attempt while the breaker is enabled.
    pub timeout: Duration,
    /// Duration to stay open before admitting a trial request.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with the breaker switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Enables or disables the breaker.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the per-attempt upper bound.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the reset timeout.
    pub fn reset_timeout(mut self, duration: Duration) -> Self {
        self.reset_timeout = duration;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding one logical endpoint.
///
/// Shared by every operation issued through the same executor. Each public
/// method takes the internal lock once, so check-and-transition sequences
/// are atomic with respect to concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Checks if a request should be allowed.
    ///
    /// An open breaker whose reset interval has elapsed moves to half-open
    /// and admits the caller as the trial request.
    pub fn can_execute(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed < self.config.reset_timeout {
                    return false;
                }
                tracing::info!("Circuit breaker transitioning to half-open");
                inner.state = CircuitState::HalfOpen;
                true
            }
        }
    }

    /// Records a successful request.
    pub fn on_success(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                tracing::info!("Circuit breaker closing after successful trial");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed request.
    pub fn on_failure(&self) {
        if !self.config.enabled {
            return;
        }

        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Circuit breaker re-opening after failed trial");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Returns the time left until an open breaker admits a trial request.
    pub fn time_until_half_open(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let elapsed = inner
            .opened_at
            .map(|opened| opened.elapsed())
            .unwrap_or(self.config.reset_timeout);
        Some(self.config.reset_timeout.saturating_sub(elapsed))
    }

    /// Resets the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .failure_threshold(threshold)
                .reset_timeout(Duration::from_millis(reset_ms)),
        )
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = breaker(3, 1000);

        for _ in 0..3 {
            assert!(cb.can_execute());
            cb.on_failure();
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_refusal_is_not_a_failure() {
        let cb = breaker(1, 1000);
        cb.on_failure();

        for _ in 0..5 {
            assert!(!cb.can_execute());
        }
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_circuit_success_resets_failures() {
        let cb = breaker(3, 1000);

        cb.on_failure();
        cb.on_failure();
        cb.on_success();

        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_half_open_after_reset_timeout() {
        let cb = breaker(1, 1000);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!cb.can_execute());
        assert_eq!(cb.time_until_half_open(), Some(Duration::from_millis(1)));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_closes_from_half_open() {
        let cb = breaker(2, 100);

        cb.on_failure();
        cb.on_failure();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(cb.can_execute());

        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_reopens_from_half_open() {
        let cb = breaker(3, 100);

        for _ in 0..3 {
            cb.on_failure();
        }
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());

        // The reset interval restarts from the failed trial.
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!cb.can_execute());
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(cb.can_execute());
    }

    #[test]
    fn test_disabled_breaker_is_inert() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::disabled().failure_threshold(1));

        for _ in 0..10 {
            cb.on_failure();
        }

        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_open_blocks_every_caller() {
        let cb = Arc::new(breaker(4, 60_000));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cb = Arc::clone(&cb);
                std::thread::spawn(move || cb.on_failure())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cb.failure_count(), 4);
        let refusals: Vec<bool> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                std::thread::spawn(move || cb.can_execute())
            })
            .map(|handle| handle.join().unwrap())
            .collect();
        assert!(refusals.iter().all(|allowed| !allowed));
    }

    #[test]
    fn test_circuit_reset() {
        let cb = breaker(1, 1000);

        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.time_until_half_open(), None);
    }
}
