//! Error types for the recommendation client.
//!
//! Every failure a caller can observe is one [`ApiError`] variant. The
//! variant alone decides whether the retry policy may try again and whether
//! the circuit breaker counts the failure, so classification happens once,
//! at the point where a transport result or HTTP status is turned into an
//! error.

use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for client operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Maximum number of body bytes kept on an error for diagnostics.
const MAX_ERROR_BODY_LEN: usize = 2048;

/// Fieldless classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport could not reach the upstream.
    Network,
    /// An attempt exceeded its deadline.
    Timeout,
    /// Upstream answered with a 5xx status.
    Server,
    /// Upstream answered with a 4xx status other than auth and timeout.
    Client,
    /// Upstream answered with 401 or 403.
    Auth,
    /// The circuit breaker refused the call.
    CircuitOpen,
    /// The operation was cancelled through its token.
    Cancelled,
    /// Invalid client configuration.
    Configuration,
    /// Request or response (de)serialization failed.
    Serialization,
    /// A registered interceptor rejected the request or response.
    Interceptor,
}

impl ErrorKind {
    /// Returns a stable, lowercase name suitable for metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Auth => "auth",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Interceptor => "interceptor",
        }
    }

    /// Returns true if an attempt failing with this kind may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for recommendation API operations.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Network/connection error.
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Correlation id of the failed attempt.
        request_id: Option<String>,
    },

    /// Timeout error, either the per-attempt guard or an HTTP 408.
    #[error("Request timeout: {message}")]
    Timeout {
        /// Error message.
        message: String,
        /// Deadline that was exceeded, when known.
        timeout: Option<Duration>,
        /// Correlation id of the failed attempt.
        request_id: Option<String>,
    },

    /// Server error (5xx status codes).
    #[error("Server error (HTTP {status_code}): {message}")]
    Server {
        /// Error message.
        message: String,
        /// HTTP status code.
        status_code: u16,
        /// Truncated response body.
        body: Option<String>,
        /// Correlation id of the failed attempt.
        request_id: Option<String>,
    },

    /// Client error: 4xx status codes other than 401, 403 and 408, and any
    /// status outside 2xx and 5xx.
    #[error("Client error (HTTP {status_code}): {message}")]
    Client {
        /// Error message.
        message: String,
        /// HTTP status code.
        status_code: u16,
        /// Truncated response body.
        body: Option<String>,
        /// Correlation id of the failed attempt.
        request_id: Option<String>,
    },

    /// Authentication or authorization error (401/403).
    #[error("Authentication failed (HTTP {status_code}): {message}")]
    Auth {
        /// Error message.
        message: String,
        /// HTTP status code.
        status_code: u16,
        /// Correlation id of the failed attempt.
        request_id: Option<String>,
    },

    /// Circuit breaker open.
    #[error("Circuit breaker open: service temporarily unavailable")]
    CircuitOpen {
        /// Time left until the breaker admits a trial request.
        retry_after: Option<Duration>,
    },

    /// Operation cancelled through its cancellation token.
    #[error("Request cancelled")]
    Cancelled {
        /// Correlation id of the attempt in flight when cancelled.
        request_id: Option<String>,
    },

    /// Configuration error (invalid base URL, thresholds, malformed request headers).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// An interceptor failed.
    #[error("Interceptor error: {message}")]
    Interceptor {
        /// Error message.
        message: String,
    },
}

impl ApiError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Auth { .. } => ErrorKind::Auth,
            ApiError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ApiError::Cancelled { .. } => ErrorKind::Cancelled,
            ApiError::Configuration { .. } => ErrorKind::Configuration,
            ApiError::Serialization { .. } => ErrorKind::Serialization,
            ApiError::Interceptor { .. } => ErrorKind::Interceptor,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns the HTTP status code, if the error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Server { status_code, .. }
            | ApiError::Client { status_code, .. }
            | ApiError::Auth { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns the correlation id of the attempt that produced this error.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ApiError::Network { request_id, .. }
            | ApiError::Timeout { request_id, .. }
            | ApiError::Server { request_id, .. }
            | ApiError::Client { request_id, .. }
            | ApiError::Auth { request_id, .. }
            | ApiError::Cancelled { request_id } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Attaches a correlation id if the variant carries one and it is unset.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            ApiError::Network { request_id, .. }
            | ApiError::Timeout { request_id, .. }
            | ApiError::Server { request_id, .. }
            | ApiError::Client { request_id, .. }
            | ApiError::Auth { request_id, .. }
            | ApiError::Cancelled { request_id } => {
                if request_id.is_none() {
                    *request_id = Some(id.into());
                }
            }
            _ => {}
        }
        self
    }

    /// Classifies a non-success HTTP response.
    pub fn from_status(status: u16, body: &[u8], request_id: Option<String>) -> Self {
        let message = error_message(status, body);
        let body = body_excerpt(body);

        match status {
            401 | 403 => ApiError::Auth {
                message,
                status_code: status,
                request_id,
            },
            408 => ApiError::Timeout {
                message,
                timeout: None,
                request_id,
            },
            500..=599 => ApiError::Server {
                message,
                status_code: status,
                body,
                request_id,
            },
            _ => ApiError::Client {
                message,
                status_code: status,
                body,
                request_id,
            },
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        ApiError::Configuration {
            message: message.into(),
        }
    }

    /// Creates an interceptor error.
    pub fn interceptor(message: impl Into<String>) -> Self {
        ApiError::Interceptor {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network {
            message: message.into(),
            request_id: None,
        }
    }

    /// Creates a server error.
    pub fn server(status_code: u16, message: impl Into<String>) -> Self {
        ApiError::Server {
            message: message.into(),
            status_code,
            body: None,
            request_id: None,
        }
    }
}

/// Pulls a human readable message out of an error body.
///
/// The recommendation API answers with `{"detail": ...}`, gateways in front
/// of it with `{"error": {"message": ...}}` or `{"message": ...}`.
fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let candidates = [
            value.get("detail"),
            value.get("message"),
            value.get("error").and_then(|e| e.get("message")),
            value.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }

    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => reason.to_string(),
        None => format!("HTTP {}", status),
    }
}

fn body_excerpt(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LEN {
        return Some(text.into_owned());
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(format!("{}...", &text[..end]))
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout } => ApiError::Timeout {
                message: format!("no response within {:?}", timeout),
                timeout: Some(timeout),
                request_id: None,
            },
            TransportError::InvalidRequest { message } => ApiError::Configuration {
                message: format!("invalid request: {}", message),
            },
            TransportError::Connection { message }
            | TransportError::Tls { message }
            | TransportError::InvalidResponse { message } => ApiError::Network {
                message,
                request_id: None,
            },
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
