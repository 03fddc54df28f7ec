//! Request payloads and per-call options.
//!
//! A [`Request`] pairs a payload with request-level headers. The payload is
//! normally the endpoint's typed request value, but raw bytes and multipart
//! forms are supported for endpoints that do not speak JSON.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Body of a request.
#[derive(Debug, Clone)]
pub enum Payload<T> {
    /// A typed value, encoded as JSON (or as query parameters on bodyless methods)
    Typed(T),
    /// Raw bytes sent as-is
    Raw {
        /// Body bytes
        bytes: Bytes,
        /// Content type, if any
        content_type: Option<String>,
    },
    /// A multipart form
    Multipart(MultipartForm),
}

/// A typed request plus request-level headers.
#[derive(Debug, Clone)]
pub struct Request<T> {
    /// Request body
    pub payload: Payload<T>,
    /// Headers attached to this request
    pub headers: Vec<(String, String)>,
}

impl<T> Request<T> {
    /// Create a request with a typed payload.
    pub fn new(value: T) -> Self {
        Self {
            payload: Payload::Typed(value),
            headers: Vec::new(),
        }
    }

    /// Create a request whose body is raw bytes.
    pub fn raw(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            payload: Payload::Raw {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
            headers: Vec::new(),
        }
    }

    /// Create a multipart form request.
    pub fn multipart(form: MultipartForm) -> Self {
        Self {
            payload: Payload::Multipart(form),
            headers: Vec::new(),
        }
    }

    /// Add a request-level header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl<T> From<T> for Request<T> {
    fn from(value: T) -> Self {
        Request::new(value)
    }
}

/// A file part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    /// File name reported to the server
    pub file_name: String,
    /// File contents
    pub bytes: Bytes,
    /// MIME type of the contents
    pub mime: mime::Mime,
}

/// Multipart form body: text fields and file parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    /// Text fields in insertion order
    pub fields: Vec<(String, String)>,
    /// File parts in insertion order
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file part with an explicit MIME type.
    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
        mime: mime::Mime,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime,
        });
        self
    }

    /// Add a file part as `application/octet-stream`.
    pub fn bytes(
        self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.file(field, file_name, bytes, mime::APPLICATION_OCTET_STREAM)
    }

    /// Returns true if the form has no fields and no files.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}

/// Predicate deciding whether an HTTP status is retryable.
pub type StatusPredicate = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Per-call options.
///
/// Everything here applies to a single `execute` call and overrides the
/// client's defaults for that call only.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Values bound to the endpoint's path placeholders
    pub path_params: BTreeMap<String, String>,
    /// Extra query parameters
    pub query: Vec<(String, String)>,
    /// Call-level headers, applied last
    pub headers: Vec<(String, String)>,
    /// Override for the number of retries after the first attempt
    pub max_retry_attempts: Option<u32>,
    /// Override for the per-attempt timeout
    pub timeout: Option<Duration>,
    /// Absolute deadline for the whole call, including waits
    pub deadline: Option<Instant>,
    /// Token that cancels the call when fired
    pub cancellation: Option<CancellationToken>,
    /// Override for which statuses are retryable
    pub retryable_status: Option<StatusPredicate>,
}

impl CallOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a path placeholder.
    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Add a call-level header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the retry count for this call.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    /// Override the per-attempt timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Give the whole call a deadline `within` from now.
    pub fn deadline_in(mut self, within: Duration) -> Self {
        self.deadline = Some(Instant::now() + within);
        self
    }

    /// Give the whole call an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Override which statuses count as retryable.
    pub fn retryable_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.retryable_status = Some(Arc::new(predicate));
        self
    }
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("path_params", &self.path_params)
            .field("query", &self.query)
            .field("headers", &crate::observability::redact_headers(&self.headers))
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .field("cancellation", &self.cancellation.is_some())
            .field("retryable_status", &self.retryable_status.is_some())
            .finish()
    }
}
