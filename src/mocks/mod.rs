//! Mock transport for testing.
//!
//! [`MockTransport`] plays back scripted replies in order and records every
//! request it receives, so tests can assert on attempt counts and on what was
//! sent without a network.

use crate::errors::{ClientError, ClientResult, TransportErrorKind};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::HeaderMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// A scripted response
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Response headers
    pub headers: HeaderMap,
}

impl MockResponse {
    /// Create a response with a status and empty body
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Create a successful JSON response
    pub fn json(value: serde_json::Value) -> Self {
        Self::status(200).with_json(value)
    }

    /// Create an error response with a JSON message body
    pub fn error(status: u16, message: &str) -> Self {
        Self::status(status).with_json(serde_json::json!({ "message": message }))
    }

    /// Create a 429 response carrying a Retry-After header
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut response = Self::error(429, "Too Many Requests");
        response
            .headers
            .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
        response
    }

    /// Replace the body with JSON
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Replace the body with raw bytes
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// One scripted reply: a response or a transport failure, optionally delayed.
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Result<MockResponse, (TransportErrorKind, String)>,
    delay: Option<Duration>,
}

impl MockReply {
    /// Reply with a response
    pub fn response(response: MockResponse) -> Self {
        Self {
            outcome: Ok(response),
            delay: None,
        }
    }

    /// Fail with a transport error
    pub fn failure(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Err((kind, message.into())),
            delay: None,
        }
    }

    /// Wait before replying
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl From<MockResponse> for MockReply {
    fn from(response: MockResponse) -> Self {
        MockReply::response(response)
    }
}

/// Mock HTTP transport for testing
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Mutex<Option<MockReply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply
    pub fn enqueue(&self, reply: impl Into<MockReply>) -> &Self {
        self.replies.lock().push_back(reply.into());
        self
    }

    /// Queue a transport failure
    pub fn enqueue_failure(&self, kind: TransportErrorKind, message: &str) -> &Self {
        self.enqueue(MockReply::failure(kind, message))
    }

    /// Reply used once the queue is empty
    pub fn respond_always(&self, reply: impl Into<MockReply>) -> &Self {
        *self.fallback.lock() = Some(reply.into());
        self
    }

    /// Get recorded requests
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Get the last request
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Clear recorded requests
    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn next_reply(&self) -> MockReply {
        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        self.fallback.lock().clone().unwrap_or_else(|| {
            MockReply::response(MockResponse::status(500).with_body("No mock response configured"))
        })
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &self.replies.lock().len())
            .field("requests", &self.request_count())
            .finish()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        self.requests.lock().push(request);
        let reply = self.next_reply();

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }

        match reply.outcome {
            Ok(response) => Ok(HttpResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
            }),
            Err((kind, message)) => Err(ClientError::Transport {
                kind,
                message,
                attempts: 0,
            }),
        }
    }
}
