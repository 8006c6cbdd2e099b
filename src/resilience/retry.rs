//! Retry policy implementation.

use rand::Rng;
use std::time::Duration;

use crate::errors::ApiError;

/// Hard ceiling on any computed retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Fraction of the base delay used as the jitter amplitude.
const JITTER_RATIO: f64 = 0.1;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Double the delay on every further retry.
    pub backoff: bool,
    /// Perturb each delay by up to 10% either way.
    pub jitter: bool,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff: true,
            jitter: true,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets whether delays grow exponentially.
    pub fn backoff(mut self, backoff: bool) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets whether to use jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the maximum delay, never above [`MAX_RETRY_DELAY`].
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay.min(MAX_RETRY_DELAY);
        self
    }

    /// Creates a configuration with no retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Stateless retry decisions: whether to retry and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Returns the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decides whether the attempt numbered `attempt` (0-based) may be followed by another.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }
        error.is_retryable()
    }

    /// Computes the wait before retry number `attempt` (1-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = if self.config.backoff {
            let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
            self.config.base_delay.saturating_mul(factor)
        } else {
            self.config.base_delay
        };

        let delay = if self.config.jitter && !base.is_zero() {
            let base_nanos = base.as_nanos() as f64;
            let spread = base_nanos * JITTER_RATIO;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            let nanos = (base_nanos + offset).max(0.0).min(u64::MAX as f64);
            Duration::from_nanos(nanos as u64)
        } else {
            base
        };

        delay.min(self.config.max_delay.min(MAX_RETRY_DELAY))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn policy(max_retries: u32, base_ms: u64, backoff: bool) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new()
                .max_retries(max_retries)
                .base_delay(Duration::from_millis(base_ms))
                .backoff(backoff)
                .jitter(false),
        )
    }

    #[test_case(ApiError::network("refused"), true; "network")]
    #[test_case(ApiError::server(503, "down"), true; "server")]
    #[test_case(ApiError::from_status(408, b"", None), true; "timeout status")]
    #[test_case(ApiError::from_status(400, b"", None), false; "client")]
    #[test_case(ApiError::from_status(401, b"", None), false; "auth")]
    #[test_case(ApiError::CircuitOpen { retry_after: None }, false; "circuit open")]
    #[test_case(ApiError::Cancelled { request_id: None }, false; "cancelled")]
    fn test_should_retry_by_kind(error: ApiError, expected: bool) {
        assert_eq!(policy(3, 100, true).should_retry(&error, 0), expected);
    }

    #[test]
    fn test_should_retry_respects_max_retries() {
        let policy = policy(2, 100, true);
        let error = ApiError::server(500, "boom");

        assert!(policy.should_retry(&error, 0));
        assert!(policy.should_retry(&error, 1));
        assert!(!policy.should_retry(&error, 2));
        assert!(!policy.should_retry(&error, 3));
    }

    #[test]
    fn test_zero_retries_never_retries() {
        let policy = policy(0, 100, true);
        assert!(!policy.should_retry(&ApiError::network("refused"), 0));
    }

    #[test]
    fn test_delay_zero_for_attempt_zero() {
        assert_eq!(policy(3, 100, true).compute_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = policy(5, 100, true);

        assert_eq!(policy.compute_delay(1), Duration::from_millis(100));
        assert_eq!(policy.compute_delay(2), Duration::from_millis(200));
        assert_eq!(policy.compute_delay(3), Duration::from_millis(400));
        assert_eq!(policy.compute_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_delay_without_backoff() {
        let policy = policy(5, 250, false);

        for attempt in 1..5 {
            assert_eq!(policy.compute_delay(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_delay_capped_at_thirty_seconds() {
        let policy = policy(20, 1000, true);

        assert_eq!(policy.compute_delay(5), Duration::from_secs(16));
        assert_eq!(policy.compute_delay(6), MAX_RETRY_DELAY);
        assert_eq!(policy.compute_delay(40), MAX_RETRY_DELAY);
        assert_eq!(policy.compute_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .base_delay(Duration::from_millis(1000))
                .backoff(true)
                .jitter(true),
        );

        for _ in 0..200 {
            let delay = policy.compute_delay(2);
            assert!(delay >= Duration::from_millis(1800), "{:?}", delay);
            assert!(delay <= Duration::from_millis(2200), "{:?}", delay);
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .base_delay(Duration::from_secs(30))
                .backoff(false)
                .jitter(true),
        );

        for _ in 0..100 {
            assert!(policy.compute_delay(1) <= MAX_RETRY_DELAY);
        }
    }
}
