//! Ordered request and response interceptors.
//!
//! Request interceptors transform every outbound attempt; response
//! interceptors transform successful responses and, once per operation,
//! the terminal error. Both lists run strictly in registration order.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::{ApiError, ApiResult};
use crate::transport::{HttpRequest, HttpResponse};

/// Handle returned on registration, used to remove the interceptor later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

/// Transforms an outbound request before each attempt.
///
/// Returning an error skips the remaining interceptors and the transport
/// call; the error becomes the attempt's failure.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Transforms the request.
    async fn intercept(&self, request: HttpRequest) -> ApiResult<HttpRequest>;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(HttpRequest) -> ApiResult<HttpRequest> + Send + Sync,
{
    async fn intercept(&self, request: HttpRequest) -> ApiResult<HttpRequest> {
        self(request)
    }
}

/// Transforms successful responses and terminal errors.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Transforms a successful response.
    async fn on_response(&self, response: HttpResponse) -> ApiResult<HttpResponse> {
        Ok(response)
    }

    /// Enriches or replaces the terminal error of an operation.
    async fn on_error(&self, error: ApiError) -> ApiError {
        error
    }
}

type ResponseFn = Box<dyn Fn(HttpResponse) -> ApiResult<HttpResponse> + Send + Sync>;
type ErrorFn = Box<dyn Fn(ApiError) -> ApiError + Send + Sync>;

/// Closure-based response interceptor with optional success and error halves.
#[derive(Default)]
pub struct ResponseHandlers {
    on_response: Option<ResponseFn>,
    on_error: Option<ErrorFn>,
}

impl ResponseHandlers {
    /// Creates handlers that pass everything through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success transform.
    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(HttpResponse) -> ApiResult<HttpResponse> + Send + Sync + 'static,
    {
        self.on_response = Some(Box::new(f));
        self
    }

    /// Sets the error transform.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ApiError) -> ApiError + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

#[async_trait]
impl ResponseInterceptor for ResponseHandlers {
    async fn on_response(&self, response: HttpResponse) -> ApiResult<HttpResponse> {
        match &self.on_response {
            Some(f) => f(response),
            None => Ok(response),
        }
    }

    async fn on_error(&self, error: ApiError) -> ApiError {
        match &self.on_error {
            Some(f) => f(error),
            None => error,
        }
    }
}

impl std::fmt::Debug for ResponseHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandlers")
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Ordered, mutable lists of request and response interceptors.
///
/// Registration is meant to happen at configuration time. Each phase
/// iterates over a snapshot taken when the phase starts, so concurrent
/// registration never affects a phase already running.
pub struct InterceptorPipeline {
    next_id: AtomicU64,
    request: RwLock<Vec<(InterceptorId, Arc<dyn RequestInterceptor>)>>,
    response: RwLock<Vec<(InterceptorId, Arc<dyn ResponseInterceptor>)>>,
}

impl InterceptorPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            request: RwLock::new(Vec::new()),
            response: RwLock::new(Vec::new()),
        }
    }

    fn allocate_id(&self) -> InterceptorId {
        InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a request interceptor.
    pub fn add_request<I>(&self, interceptor: I) -> InterceptorId
    where
        I: RequestInterceptor + 'static,
    {
        self.add_request_arc(Arc::new(interceptor))
    }

    /// Appends a shared request interceptor.
    pub fn add_request_arc(&self, interceptor: Arc<dyn RequestInterceptor>) -> InterceptorId {
        let id = self.allocate_id();
        self.request.write().push((id, interceptor));
        id
    }

    /// Removes a request interceptor. Returns false if it was not registered.
    pub fn remove_request(&self, id: InterceptorId) -> bool {
        let mut request = self.request.write();
        let before = request.len();
        request.retain(|(existing, _)| *existing != id);
        request.len() != before
    }

    /// Appends a response interceptor.
    pub fn add_response<I>(&self, interceptor: I) -> InterceptorId
    where
        I: ResponseInterceptor + 'static,
    {
        self.add_response_arc(Arc::new(interceptor))
    }

    /// Appends a shared response interceptor.
    pub fn add_response_arc(&self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorId {
        let id = self.allocate_id();
        self.response.write().push((id, interceptor));
        id
    }

    /// Removes a response interceptor. Returns false if it was not registered.
    pub fn remove_response(&self, id: InterceptorId) -> bool {
        let mut response = self.response.write();
        let before = response.len();
        response.retain(|(existing, _)| *existing != id);
        response.len() != before
    }

    /// Returns the number of request interceptors.
    pub fn request_len(&self) -> usize {
        self.request.read().len()
    }

    /// Returns the number of response interceptors.
    pub fn response_len(&self) -> usize {
        self.response.read().len()
    }

    /// Removes every interceptor.
    pub fn clear(&self) {
        self.request.write().clear();
        self.response.write().clear();
    }

    fn request_snapshot(&self) -> Vec<Arc<dyn RequestInterceptor>> {
        self.request
            .read()
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect()
    }

    fn response_snapshot(&self) -> Vec<Arc<dyn ResponseInterceptor>> {
        self.response
            .read()
            .iter()
            .map(|(_, interceptor)| Arc::clone(interceptor))
            .collect()
    }

    /// Runs the request interceptors in order, stopping at the first failure.
    pub async fn apply_request(&self, request: HttpRequest) -> ApiResult<HttpRequest> {
        let mut request = request;
        for interceptor in self.request_snapshot() {
            request = interceptor.intercept(request).await?;
        }
        Ok(request)
    }

    /// Runs the success transforms in order, stopping at the first failure.
    pub async fn apply_response(&self, response: HttpResponse) -> ApiResult<HttpResponse> {
        let mut response = response;
        for interceptor in self.response_snapshot() {
            response = interceptor.on_response(response).await?;
        }
        Ok(response)
    }

    /// Runs the error transforms in order; each may replace the error.
    pub async fn apply_error(&self, error: ApiError) -> ApiError {
        let mut error = error;
        for interceptor in self.response_snapshot() {
            error = interceptor.on_error(error).await;
        }
        error
    }
}

impl Default for InterceptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("request", &self.request_len())
            .field("response", &self.response_len())
            .finish()
    }
}
