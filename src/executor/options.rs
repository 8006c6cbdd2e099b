//! Per-call request options.

use std::time::Duration;

use crate::cancellation::CancellationToken;

/// Options recognised by every executor call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers applied after the configured default headers.
    pub headers: Vec<(String, String)>,
    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,
    /// External cancellation handle.
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Overrides the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches an external cancellation handle.
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}
