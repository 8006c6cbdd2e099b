//! Request executor for the recommendation API.
//!
//! A [`RequestExecutor`] runs one logical call from the circuit breaker
//! check through every retry to a single terminal outcome:
//!
//! ```text
//! can_execute -> build request -> request interceptors -> transport
//!     -> on_success -> success transforms -> Ok
//!     -> on_failure -> wait compute_delay(n) -> next attempt
//!                   -> error transforms -> Err
//! ```
//!
//! The executor is cheap to clone; clones share the breaker, the
//! interceptor lists and the metrics.

mod options;
mod state;

pub use options::RequestOptions;
pub use state::OperationState;

use reqwest::header::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{ApiKeyAuth, AuthInterceptor, AuthProvider};
use crate::cancellation::CancellationToken;
use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::errors::{ApiError, ApiResult};
use crate::interceptors::{InterceptorId, InterceptorPipeline, RequestInterceptor, ResponseInterceptor};
use crate::observability::{ClientMetrics, DefaultMetricsCollector, MetricsCollector};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
use crate::transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};

use state::Operation;

struct ExecutorInner {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    interceptors: InterceptorPipeline,
    metrics: Arc<dyn MetricsCollector>,
}

/// Resilient executor for calls to the recommendation API.
///
/// # Example
///
/// ```rust,no_run
/// use recommendation_client::{RecommendationClient, RequestOptions};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RecommendationClient::builder()
///         .base_url("https://reco.example.com/api")
///         .retries(2)
///         .build()?;
///
///     let response = client
///         .get("recommendations/user-42", RequestOptions::new())
///         .await?;
///     println!("{} ({:?})", response.status, response.request_id());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
}

impl RequestExecutor {
    /// Creates a new executor builder.
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::new()
    }

    /// Creates an executor with the default transport.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        RequestExecutorBuilder::from_config(config).build()
    }

    /// Creates an executor from environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> ApiResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the circuit breaker shared by every operation of this executor.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Returns the interceptor pipeline.
    pub fn interceptors(&self) -> &InterceptorPipeline {
        &self.inner.interceptors
    }

    /// Returns a snapshot of the collected metrics.
    pub fn metrics(&self) -> ClientMetrics {
        self.inner.metrics.snapshot()
    }

    /// Appends a request interceptor. It runs on every later attempt.
    pub fn add_request_interceptor<I>(&self, interceptor: I) -> InterceptorId
    where
        I: RequestInterceptor + 'static,
    {
        self.inner.interceptors.add_request(interceptor)
    }

    /// Removes a request interceptor. Returns false if it was not registered.
    pub fn remove_request_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.interceptors.remove_request(id)
    }

    /// Appends a response interceptor.
    pub fn add_response_interceptor<I>(&self, interceptor: I) -> InterceptorId
    where
        I: ResponseInterceptor + 'static,
    {
        self.inner.interceptors.add_response(interceptor)
    }

    /// Removes a response interceptor. Returns false if it was not registered.
    pub fn remove_response_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.interceptors.remove_response(id)
    }

    /// Sends a GET request.
    pub async fn get(&self, path: &str, options: RequestOptions) -> ApiResult<HttpResponse> {
        self.request(HttpMethod::Get, path, None, options).await
    }

    /// Sends a POST request with an optional JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
        options: RequestOptions,
    ) -> ApiResult<HttpResponse> {
        self.json_request(HttpMethod::Post, path, body, options).await
    }

    /// Sends a PUT request with an optional JSON body.
    pub async fn put(
        &self,
        path: &str,
        body: Option<&serde_json::Value>,
        options: RequestOptions,
    ) -> ApiResult<HttpResponse> {
        self.json_request(HttpMethod::Put, path, body, options).await
    }

    /// Sends a DELETE request.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> ApiResult<HttpResponse> {
        self.request(HttpMethod::Delete, path, None, options).await
    }

    /// Sends a GET request and deserializes the JSON response.
    pub async fn get_json<T>(&self, path: &str, options: RequestOptions) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.get(path, options).await?;
        Ok(response.json()?)
    }

    /// Sends a POST request with a JSON body and deserializes the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, options: RequestOptions) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body)?;
        let response = self
            .request(HttpMethod::Post, path, Some(body), with_json_content_type(options))
            .await?;
        Ok(response.json()?)
    }

    async fn json_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
        options: RequestOptions,
    ) -> ApiResult<HttpResponse> {
        match body {
            Some(value) => {
                let body = serde_json::to_vec(value)?;
                self.request(method, path, Some(body), with_json_content_type(options))
                    .await
            }
            None => self.request(method, path, None, options).await,
        }
    }

    /// Runs one logical operation.
    ///
    /// Returns the first successful response, or the single terminal error
    /// after retries are exhausted, the error is not retryable, the circuit
    /// breaker refuses the call, or the operation is cancelled.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> ApiResult<HttpResponse> {
        let started = Instant::now();
        // Unlinks from the caller's signal when the operation settles.
        let link = options.signal.as_ref().map(CancellationToken::child_token);
        let token = link
            .as_ref()
            .map(|child| child.token().clone())
            .unwrap_or_default();

        let result = self.run(method, path, body.as_deref(), &options, &token).await;

        match &result {
            Ok(response) => {
                self.inner.metrics.record_success(started.elapsed());
                tracing::debug!(
                    status = response.status,
                    request_id = response.request_id().unwrap_or_default(),
                    "Request succeeded"
                );
            }
            Err(error) => {
                self.inner.metrics.record_failure(error.kind(), started.elapsed());
                tracing::warn!(
                    kind = %error.kind(),
                    request_id = error.request_id().unwrap_or_default(),
                    error = %error,
                    "Request failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
        token: &CancellationToken,
    ) -> ApiResult<HttpResponse> {
        let inner = &self.inner;
        let mut op = Operation::new();

        if !inner.breaker.can_execute() {
            op.transition(OperationState::FailedTerminal);
            tracing::warn!("Circuit breaker refused request");
            return Err(ApiError::CircuitOpen {
                retry_after: inner.breaker.time_until_half_open(),
            });
        }

        let mut attempt: u32 = 0;
        loop {
            op.transition(OperationState::Executing);
            let request_id = Uuid::new_v4().to_string();

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(self.cancelled(&mut op, request_id.clone(), attempt).await);
                }
                outcome = self.attempt(method, path, body, options, &request_id, attempt) => outcome,
            };

            let error = match outcome {
                Ok(response) => {
                    let response = response.with_request_id(request_id.as_str());
                    return match inner.interceptors.apply_response(response).await {
                        Ok(response) => {
                            op.transition(OperationState::Succeeded);
                            Ok(response)
                        }
                        Err(error) => {
                            op.transition(OperationState::FailedTerminal);
                            let error = error.with_request_id(request_id);
                            Err(inner.interceptors.apply_error(error).await)
                        }
                    };
                }
                Err(error) => error,
            };

            if !inner.retry.should_retry(&error, attempt) {
                op.transition(OperationState::FailedTerminal);
                return Err(inner.interceptors.apply_error(error).await);
            }

            let delay = inner.retry.compute_delay(attempt + 1);
            op.transition(OperationState::Waiting);
            inner.metrics.record_retry(delay);
            tracing::info!(
                request_id = %request_id,
                attempt = attempt + 1,
                max_retries = inner.retry.max_retries(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying request"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(self.cancelled(&mut op, request_id, attempt).await);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    async fn cancelled(&self, op: &mut Operation, request_id: String, attempt: u32) -> ApiError {
        op.transition(OperationState::Cancelled);
        tracing::info!(request_id = %request_id, attempt, "Request cancelled");
        let error = ApiError::Cancelled {
            request_id: Some(request_id),
        };
        self.inner.interceptors.apply_error(error).await
    }

    /// Runs a single attempt and records its outcome on the breaker.
    ///
    /// A request interceptor failure or a malformed request ends the attempt
    /// before the transport is called and leaves the breaker untouched.
    async fn attempt(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
        request_id: &str,
        attempt: u32,
    ) -> ApiResult<HttpResponse> {
        let inner = &self.inner;
        let request = self.build_request(method, path, body, options, request_id);
        let request = inner
            .interceptors
            .apply_request(request)
            .await
            .map_err(|error| error.with_request_id(request_id))?;
        validate_headers(&request)?;
        let deadline = request.timeout.unwrap_or(inner.config.timeout);

        inner.metrics.record_attempt();
        tracing::debug!(request_id = %request_id, attempt, url = %request.url, "Sending request");

        let result = match tokio::time::timeout(deadline, inner.transport.send(request)).await {
            Err(_) => Err(ApiError::Timeout {
                message: format!("no response within {}ms", deadline.as_millis()),
                timeout: Some(deadline),
                request_id: Some(request_id.to_string()),
            }),
            Ok(Err(TransportError::InvalidRequest { message })) => {
                tracing::warn!(request_id = %request_id, %message, "Transport rejected request");
                return Err(ApiError::from(TransportError::InvalidRequest { message }));
            }
            Ok(Err(error)) => Err(ApiError::from(error).with_request_id(request_id)),
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(ApiError::from_status(
                response.status,
                &response.body,
                Some(request_id.to_string()),
            )),
        };

        match &result {
            Ok(_) => inner.breaker.on_success(),
            Err(error) => {
                inner.breaker.on_failure();
                tracing::debug!(
                    request_id = %request_id,
                    attempt,
                    kind = %error.kind(),
                    "Attempt failed"
                );
            }
        }

        result
    }

    /// Builds the base request of one attempt.
    ///
    /// Default headers are applied first, then caller headers, then the
    /// correlation header, each replacing earlier values of the same name.
    fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&[u8]>,
        options: &RequestOptions,
        request_id: &str,
    ) -> HttpRequest {
        let config = &self.inner.config;
        let mut request = HttpRequest::new(method, config.endpoint_url(path))
            .with_timeout(config.effective_timeout(options.timeout));

        for (name, value) in config.default_headers.iter().chain(options.headers.iter()) {
            request.set_header(name.as_str(), value.as_str());
        }
        request.set_header(config.correlation_header.as_str(), request_id);

        if let Some(body) = body {
            request.body = Some(body.to_vec());
        }

        request
    }
}

/// Rejects header names and values that cannot go on the wire.
fn validate_headers(request: &HttpRequest) -> ApiResult<()> {
    for (name, value) in &request.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ApiError::configuration(format!(
                "invalid request header name {:?}",
                name
            )));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(ApiError::configuration(format!(
                "invalid value for request header {:?}",
                name
            )));
        }
    }
    Ok(())
}

fn with_json_content_type(mut options: RequestOptions) -> RequestOptions {
    let has_content_type = options
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if !has_content_type {
        options
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
    }
    options
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("config", &self.inner.config)
            .field("breaker", &self.inner.breaker.state())
            .field("request_interceptors", &self.inner.interceptors.request_len())
            .field("response_interceptors", &self.inner.interceptors.response_len())
            .finish()
    }
}

/// Builder for [`RequestExecutor`].
pub struct RequestExecutorBuilder {
    config: Option<ClientConfig>,
    config_builder: ClientConfigBuilder,
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl RequestExecutorBuilder {
    /// Creates a new executor builder.
    pub fn new() -> Self {
        Self {
            config: None,
            config_builder: ClientConfigBuilder::new(),
            transport: None,
            auth: None,
            metrics: None,
        }
    }

    /// Creates a builder from an existing configuration.
    ///
    /// Configuration setters on the builder are ignored afterwards.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new()
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(base_url);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the maximum retry attempts.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.retries(retries);
        self
    }

    /// Sets the delay before the first retry.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config_builder = self.config_builder.retry_delay(delay);
        self
    }

    /// Enables or disables exponential backoff.
    pub fn retry_backoff(mut self, backoff: bool) -> Self {
        self.config_builder = self.config_builder.retry_backoff(backoff);
        self
    }

    /// Enables or disables jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.config_builder = self.config_builder.jitter(jitter);
        self
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config_builder = self.config_builder.circuit_breaker(config);
        self
    }

    /// Adds a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.header(name, value);
        self
    }

    /// Sets the bearer key for admin endpoints.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_key(api_key);
        self
    }

    /// Sets a custom transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom auth provider. Takes precedence over a configured key.
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the executor.
    pub fn build(self) -> ApiResult<RequestExecutor> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(config.timeout)
                    .map_err(|e| ApiError::configuration(e.to_string()))?,
            ),
        };

        let auth = self.auth.or_else(|| {
            config
                .api_key()
                .map(|key| Arc::new(ApiKeyAuth::from_string(key)) as Arc<dyn AuthProvider>)
        });

        let interceptors = InterceptorPipeline::new();
        if let Some(auth) = auth {
            auth.validate()?;
            interceptors.add_request(AuthInterceptor::new(auth));
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(DefaultMetricsCollector::new()));

        tracing::debug!(
            base_url = %config.base_url,
            retries = config.retries,
            circuit_breaker = config.circuit_breaker.enabled,
            "Recommendation client created"
        );

        Ok(RequestExecutor {
            inner: Arc::new(ExecutorInner {
                breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
                retry: RetryPolicy::new(config.retry_config()),
                config,
                transport,
                interceptors,
                metrics,
            }),
        })
    }
}

impl Default for RequestExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
