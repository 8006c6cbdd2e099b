//! Recommendation API Client Library
//!
//! The outbound-request layer used by recommendation frontends (demo UI,
//! storefront, admin consoles) to call the recommendation API. Every call
//! goes through a single [`RequestExecutor`] that composes:
//!
//! - **Circuit breaker**: a three-state guard shared by all calls of one executor
//! - **Retries**: exponential backoff with optional jitter, capped at 30 seconds
//! - **Interceptors**: ordered request and response transforms, removable by id
//! - **Cancellation**: cooperative, per-operation tokens linked to caller signals
//! - **Correlation**: a fresh UUID v4 `X-Request-ID` on every attempt
//! - **Observability**: `tracing` events and pluggable metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use recommendation_client::{RecommendationClient, RequestOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RecommendationClient::builder()
//!         .base_url("https://reco.example.com/api")
//!         .retries(2)
//!         .retry_delay(Duration::from_millis(200))
//!         .build()?;
//!
//!     let items: serde_json::Value = client
//!         .get_json("recommendations/user-42", RequestOptions::new())
//!         .await?;
//!     println!("{items}");
//!     Ok(())
//! }
//! ```
//!
//! # Cancellation Example
//!
//! ```rust,no_run
//! use recommendation_client::{CancellationToken, RecommendationClient, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RecommendationClient::builder()
//!         .base_url("https://reco.example.com/api")
//!         .build()?;
//!
//!     let signal = CancellationToken::new();
//!     let search = client.get("search?q=boots", RequestOptions::new().signal(signal.clone()));
//!
//!     // A newer keystroke supersedes the search.
//!     signal.cancel();
//!     assert!(search.await.is_err());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod cancellation;
pub mod config;
pub mod errors;
pub mod executor;
pub mod interceptors;
pub mod observability;
pub mod resilience;
pub mod transport;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

// Re-exports for convenience
pub use auth::{ApiKeyAuth, AuthInterceptor, AuthProvider};
pub use cancellation::{CancellationToken, ChildToken};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use errors::{ApiError, ApiResult, ErrorKind};
pub use executor::{OperationState, RequestExecutor, RequestExecutorBuilder, RequestOptions};
pub use interceptors::{
    InterceptorId, InterceptorPipeline, RequestInterceptor, ResponseHandlers, ResponseInterceptor,
};
pub use observability::{
    ClientMetrics, DefaultMetricsCollector, LogFormat, LogLevel, LoggingConfig, MetricsCollector,
    NoopMetricsCollector,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};

/// Facade name used by frontends.
pub use executor::RequestExecutor as RecommendationClient;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
