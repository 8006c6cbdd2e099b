//! Observability for the recommendation client.
//!
//! Logging goes through `tracing`; every event emitted by the executor
//! carries the correlation id of the attempt it describes. Counters for
//! attempts, retries and terminal outcomes are collected through a
//! pluggable [`MetricsCollector`].

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{ClientMetrics, DefaultMetricsCollector, MetricsCollector, NoopMetricsCollector};
