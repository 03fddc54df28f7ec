//! HTTP transport layer.
//!
//! The transport performs exactly one network exchange per call and never
//! interprets status codes. Classification belongs to the executor.

mod http_transport;

pub use http_transport::{HttpTransport, ReqwestTransport};

#[cfg(test)]
pub(crate) use http_transport::MockHttpTransport;

use crate::request::MultipartForm;
use bytes::Bytes;
use http::HeaderMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET request.
    Get,
    /// POST request.
    Post,
    /// PUT request.
    Put,
    /// PATCH request.
    Patch,
    /// DELETE request.
    Delete,
    /// HEAD request.
    Head,
    /// OPTIONS request.
    Options,
}

impl Method {
    /// Whether a typed payload travels in the body for this method.
    ///
    /// Bodyless methods carry typed payloads as query parameters instead.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Body as it goes over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireBody {
    /// No body
    Empty,
    /// Encoded bytes
    Bytes {
        /// Body bytes
        data: Bytes,
        /// Content type header value, if any
        content_type: Option<String>,
    },
    /// Multipart form, encoded by the transport
    Multipart(MultipartForm),
}

impl WireBody {
    /// Returns true if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, WireBody::Empty)
    }
}

/// A fully prepared HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including query string
    pub url: Url,
    /// Merged headers
    pub headers: HeaderMap,
    /// Request body
    pub body: WireBody,
    /// Per-attempt timeout
    pub timeout: Option<Duration>,
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
