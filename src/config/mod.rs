//! Configuration module for the recommendation client.
//!
//! Provides the construction-time settings of a
//! [`RequestExecutor`](crate::executor::RequestExecutor): base URL, timeouts,
//! retry behaviour and circuit breaker settings.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::errors::{ApiError, ApiResult};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Default per-attempt timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum retry attempts.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default header carrying the per-attempt correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "X-Request-ID";

/// Configuration for the recommendation client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every request path is joined onto.
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Maximum retry attempts after the first one.
    pub retries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Grow the retry delay exponentially.
    pub retry_backoff: bool,
    /// Randomize retry delays by up to 10%.
    pub jitter: bool,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Headers included in every request, before caller headers.
    pub default_headers: Vec<(String, String)>,
    /// Header name carrying the correlation id.
    pub correlation_header: String,
    /// Bearer key for admin endpoints (stored securely).
    pub(crate) api_key: Option<SecretString>,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RECO_API_BASE_URL` (required): base URL of the recommendation API
    /// - `RECO_API_TIMEOUT_MS` (optional): per-attempt timeout in milliseconds
    /// - `RECO_API_RETRIES` (optional): maximum retry attempts
    /// - `RECO_API_RETRY_DELAY_MS` (optional): delay before the first retry
    /// - `RECO_API_CIRCUIT_BREAKER` (optional): `true` or `false`
    /// - `RECO_API_KEY` (optional): bearer key for admin endpoints
    pub fn from_env() -> ApiResult<Self> {
        let base_url = std::env::var("RECO_API_BASE_URL").map_err(|_| {
            ApiError::configuration("RECO_API_BASE_URL environment variable not set")
        })?;

        let mut builder = ClientConfigBuilder::new().base_url(base_url);

        if let Some(ms) = env_parse::<u64>("RECO_API_TIMEOUT_MS") {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        if let Some(retries) = env_parse::<u32>("RECO_API_RETRIES") {
            builder = builder.retries(retries);
        }

        if let Some(ms) = env_parse::<u64>("RECO_API_RETRY_DELAY_MS") {
            builder = builder.retry_delay(Duration::from_millis(ms));
        }

        if let Some(enabled) = env_parse::<bool>("RECO_API_CIRCUIT_BREAKER") {
            let circuit_breaker = CircuitBreakerConfig::default().enabled(enabled);
            builder = builder.circuit_breaker(circuit_breaker);
        }

        if let Ok(api_key) = std::env::var("RECO_API_KEY") {
            builder = builder.api_key(api_key);
        }

        builder.build()
    }

    /// Returns the retry configuration derived from these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retries)
            .base_delay(self.retry_delay)
            .backoff(self.retry_backoff)
            .jitter(self.jitter)
    }

    /// Resolves the deadline of one attempt.
    ///
    /// A per-request override replaces the configured timeout; while the
    /// circuit breaker is enabled its `timeout` is an upper bound.
    pub fn effective_timeout(&self, per_request: Option<Duration>) -> Duration {
        let timeout = per_request.unwrap_or(self.timeout);
        if self.circuit_breaker.enabled {
            timeout.min(self.circuit_breaker.timeout)
        } else {
            timeout
        }
    }

    /// Returns the full URL for a path.
    ///
    /// Absolute `http(s)://` targets are used as given.
    pub fn endpoint_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Returns the API key (exposing the secret).
    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret().as_str())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable environment variable");
            None
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_backoff", &self.retry_backoff)
            .field("jitter", &self.jitter)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("correlation_header", &self.correlation_header)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Builder for `ClientConfig`.
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    retries: Option<u32>,
    retry_delay: Option<Duration>,
    retry_backoff: bool,
    jitter: bool,
    circuit_breaker: CircuitBreakerConfig,
    default_headers: Vec<(String, String)>,
    correlation_header: Option<String>,
    api_key: Option<String>,
}

impl ClientConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: None,
            retries: None,
            retry_delay: None,
            retry_backoff: true,
            jitter: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            default_headers: Vec::new(),
            correlation_header: None,
            api_key: None,
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the maximum retry attempts.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the delay before the first retry.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets whether retry delays grow exponentially.
    pub fn retry_backoff(mut self, backoff: bool) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets whether retry delays are jittered.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the correlation id header name.
    pub fn correlation_header(mut self, name: impl Into<String>) -> Self {
        self.correlation_header = Some(name.into());
        self
    }

    /// Sets the bearer key for admin endpoints.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ApiResult<ClientConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| ApiError::configuration("Base URL is required"))?
            .trim_end_matches('/')
            .to_string();

        let parsed = url::Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::configuration(format!(
                "Base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ApiError::configuration("Timeout must be greater than zero"));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ApiError::configuration(
                "Circuit breaker failure threshold must be at least 1",
            ));
        }

        let correlation_header = self
            .correlation_header
            .unwrap_or_else(|| DEFAULT_CORRELATION_HEADER.to_string());
        if correlation_header.trim().is_empty() {
            return Err(ApiError::configuration(
                "Correlation header name cannot be empty",
            ));
        }

        let api_key = match self.api_key {
            Some(key) if key.is_empty() => {
                return Err(ApiError::configuration("API key cannot be empty"));
            }
            Some(key) => Some(SecretString::new(key)),
            None => None,
        };

        Ok(ClientConfig {
            base_url,
            timeout,
            retries: self.retries.unwrap_or(DEFAULT_RETRIES),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            retry_backoff: self.retry_backoff,
            jitter: self.jitter,
            circuit_breaker: self.circuit_breaker,
            default_headers: self.default_headers,
            correlation_header,
            api_key,
        })
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
