//! Mock implementations for testing.
//!
//! Provides a scripted transport that records every request it receives,
//! so tests can drive the executor through failures, delays and
//! successes without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// A mock response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl MockResponse {
    /// Creates a successful JSON response.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Self {
            status: 200,
            headers,
            body,
        }
    }

    /// Creates an empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Creates an error response in the API's `{"detail": ...}` shape.
    pub fn error(status: u16, message: &str) -> Self {
        let mut response = Self::json(&serde_json::json!({ "detail": message }));
        response.status = status;
        response
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    fn into_http(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
            request_id: None,
        }
    }
}

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Answer with a response.
    Respond(MockResponse),
    /// Fail without a response.
    Fail(TransportError),
    /// Wait, then produce the inner outcome.
    Delay(Duration, Box<MockOutcome>),
}

impl MockOutcome {
    /// Delays this outcome.
    pub fn after(self, delay: Duration) -> Self {
        MockOutcome::Delay(delay, Box::new(self))
    }

    /// A connection failure.
    pub fn connection_refused() -> Self {
        MockOutcome::Fail(TransportError::Connection {
            message: "connection refused".to_string(),
        })
    }
}

impl From<MockResponse> for MockOutcome {
    fn from(response: MockResponse) -> Self {
        MockOutcome::Respond(response)
    }
}

/// Mock HTTP transport for testing.
pub struct MockTransport {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    requests: Mutex<Vec<HttpRequest>>,
    default_outcome: Mutex<Option<MockOutcome>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_outcome: Mutex::new(None),
        }
    }

    /// Queues an outcome.
    pub fn queue(&self, outcome: impl Into<MockOutcome>) {
        self.outcomes.lock().push_back(outcome.into());
    }

    /// Queues a JSON response.
    pub fn queue_json<T: serde::Serialize>(&self, value: &T) {
        self.queue(MockResponse::json(value));
    }

    /// Queues an error response.
    pub fn queue_error(&self, status: u16, message: &str) {
        self.queue(MockResponse::error(status, message));
    }

    /// Sets the outcome used once the queue is empty.
    pub fn set_default(&self, outcome: impl Into<MockOutcome>) {
        *self.default_outcome.lock() = Some(outcome.into());
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    /// Returns the number of requests made.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_outcome(&self) -> MockOutcome {
        if let Some(outcome) = self.outcomes.lock().pop_front() {
            return outcome;
        }
        self.default_outcome
            .lock()
            .clone()
            .unwrap_or_else(|| {
                MockOutcome::Respond(MockResponse::error(500, "No mock response configured"))
            })
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);

        let mut outcome = self.next_outcome();
        loop {
            match outcome {
                MockOutcome::Respond(response) => return Ok(response.into_http()),
                MockOutcome::Fail(error) => return Err(error),
                MockOutcome::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    outcome = *inner;
                }
            }
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_outcomes_in_order() {
        let transport = MockTransport::new();
        transport.queue(MockOutcome::connection_refused());
        transport.queue_json(&serde_json::json!({"ok": true}));

        let first = transport.send(HttpRequest::get("http://mock/a")).await;
        assert!(matches!(first, Err(TransportError::Connection { .. })));

        let second = transport.send(HttpRequest::get("http://mock/b")).await.unwrap();
        assert_eq!(second.status, 200);

        let third = transport.send(HttpRequest::get("http://mock/c")).await.unwrap();
        assert_eq!(third.status, 500);

        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.last_request().unwrap().url, "http://mock/c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_outcome() {
        let transport = MockTransport::new();
        transport.set_default(MockOutcome::from(MockResponse::status(204)).after(Duration::from_secs(5)));

        let started = tokio::time::Instant::now();
        let response = transport.send(HttpRequest::get("http://mock")).await.unwrap();

        assert_eq!(response.status, 204);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
