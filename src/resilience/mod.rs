//! Resilience primitives for the recommendation client.
//!
//! Provides the retry policy and the circuit breaker. Both are leaf
//! components: the [`RequestExecutor`](crate::executor::RequestExecutor)
//! decides when to consult them.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryConfig, RetryPolicy, MAX_RETRY_DELAY};
