//! Single-attempt request execution.
//!
//! The executor turns an endpoint, a request and per-call options into an
//! [`HttpRequest`], performs exactly one transport call, and classifies what
//! came back. It never retries; that is the client's job.

use crate::endpoint::Endpoint;
use crate::errors::{ClientError, ClientResult};
use crate::observability::redact_header_map;
use crate::request::{CallOptions, Payload, Request, StatusPredicate};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, WireBody};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Classified outcome of one attempt.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The response decoded into the declared type
    Success(T),
    /// A status in the retryable set (5xx, 429, or configured)
    RetryableFailure(ClientError),
    /// A status in the permanent set, or a malformed success body
    PermanentFailure(ClientError),
    /// No HTTP response was received
    TransportFailure(ClientError),
}

impl<T> AttemptOutcome<T> {
    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    /// HTTP status for HTTP-level failures.
    pub fn status(&self) -> Option<u16> {
        self.error().and_then(ClientError::status_code)
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&ClientError> {
        match self {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::RetryableFailure(e)
            | AttemptOutcome::PermanentFailure(e)
            | AttemptOutcome::TransportFailure(e) => Some(e),
        }
    }

    /// Convert into the call's result, stamping the attempt count on failures.
    pub fn into_result(self, attempts: u32) -> ClientResult<T> {
        match self {
            AttemptOutcome::Success(value) => Ok(value),
            AttemptOutcome::RetryableFailure(e)
            | AttemptOutcome::PermanentFailure(e)
            | AttemptOutcome::TransportFailure(e) => Err(e.with_attempts(attempts)),
        }
    }
}

/// Default retryable set: 429 and every 5xx.
pub fn default_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Performs single attempts against one base URL.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retryable_status: Option<StatusPredicate>,
}

impl RequestExecutor {
    /// Create an executor for `base_url`.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
            default_headers: HeaderMap::new(),
            timeout: None,
            retryable_status: None,
        }
    }

    /// Set client-level default headers.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Set the default per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the default retryable-status set.
    pub fn with_retryable_status(mut self, predicate: Option<StatusPredicate>) -> Self {
        self.retryable_status = predicate;
        self
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the wire request for one call.
    ///
    /// Fails before any network activity on template, header or encoding errors.
    pub fn prepare<Req, Resp>(
        &self,
        endpoint: &Endpoint<Req, Resp>,
        request: &Request<Req>,
        options: &CallOptions,
    ) -> ClientResult<HttpRequest>
    where
        Req: Serialize,
    {
        let path = endpoint.render(&options.path_params)?;
        let mut url = self.resolve(&path)?;
        let mut query = Vec::new();

        let body = match &request.payload {
            Payload::Typed(value) => {
                let encoded = serde_json::to_value(value)?;
                if endpoint.method().carries_body() {
                    if encoded.is_null() {
                        WireBody::Empty
                    } else {
                        WireBody::Bytes {
                            data: Bytes::from(serde_json::to_vec(&encoded)?),
                            content_type: Some(mime::APPLICATION_JSON.to_string()),
                        }
                    }
                } else {
                    query.extend(query_pairs(encoded)?);
                    WireBody::Empty
                }
            }
            Payload::Raw {
                bytes,
                content_type,
            } => WireBody::Bytes {
                data: bytes.clone(),
                content_type: content_type.clone(),
            },
            Payload::Multipart(form) => WireBody::Multipart(form.clone()),
        };

        query.extend(options.query.iter().cloned());
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
        }

        let mut headers = self.default_headers.clone();
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }
        merge_headers(&mut headers, &request.headers)?;
        merge_headers(&mut headers, &options.headers)?;

        if let WireBody::Bytes {
            content_type: Some(content_type),
            ..
        } = &body
        {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, header_value(content_type)?);
            }
        }

        Ok(HttpRequest {
            method: endpoint.method(),
            url,
            headers,
            body,
            timeout: options.timeout.or(self.timeout),
        })
    }

    /// Perform one transport call and classify the result.
    pub async fn send<Resp>(
        &self,
        request: HttpRequest,
        retryable_status: Option<&StatusPredicate>,
    ) -> AttemptOutcome<Resp>
    where
        Resp: DeserializeOwned,
    {
        debug!(
            method = %request.method,
            url = %request.url,
            headers = ?redact_header_map(&request.headers),
            "Sending request"
        );

        match self.transport.send(request).await {
            Ok(response) => {
                let predicate = retryable_status.or(self.retryable_status.as_ref());
                classify(response, predicate)
            }
            Err(e @ ClientError::Transport { .. }) => AttemptOutcome::TransportFailure(e),
            Err(e) => AttemptOutcome::PermanentFailure(e),
        }
    }

    /// Prepare and send in one step.
    pub async fn attempt<Req, Resp>(
        &self,
        endpoint: &Endpoint<Req, Resp>,
        request: &Request<Req>,
        options: &CallOptions,
    ) -> ClientResult<AttemptOutcome<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let prepared = self.prepare(endpoint, request, options)?;
        Ok(self
            .send(prepared, options.retryable_status.as_ref())
            .await)
    }

    fn resolve(&self, path: &str) -> ClientResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.is_empty() || path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Url::parse(&joined).map_err(ClientError::from)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn classify<Resp>(response: HttpResponse, retryable: Option<&StatusPredicate>) -> AttemptOutcome<Resp>
where
    Resp: DeserializeOwned,
{
    let status = response.status;
    let is_retryable = match retryable {
        Some(predicate) => predicate(status),
        None => default_retryable_status(status),
    };

    if is_retryable {
        return AttemptOutcome::RetryableFailure(ClientError::Retryable {
            status,
            message: status_message(status),
            retry_after: parse_retry_after(&response.headers),
            attempts: 0,
        });
    }

    if !response.is_success() {
        return AttemptOutcome::PermanentFailure(ClientError::Permanent {
            status,
            message: status_message(status),
            body: String::from_utf8(response.body.to_vec()).ok(),
            attempts: 0,
        });
    }

    let decoded = if response.body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(&response.body)
    };

    match decoded {
        Ok(value) => AttemptOutcome::Success(value),
        Err(e) => AttemptOutcome::PermanentFailure(ClientError::Decode {
            status,
            message: e.to_string(),
            attempts: 0,
        }),
    }
}

fn status_message(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// Parse a `Retry-After` header given in seconds.
///
/// Values too large for a `Duration` saturate; the retry policy caps them.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

/// Build a header map from name/value pairs.
pub(crate) fn header_map(pairs: &[(String, String)]) -> ClientResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    merge_headers(&mut headers, pairs)?;
    Ok(headers)
}

fn merge_headers(headers: &mut HeaderMap, extra: &[(String, String)]) -> ClientResult<()> {
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ClientError::configuration(format!("Invalid header name '{}': {}", name, e))
        })?;
        headers.insert(name, header_value(value)?);
    }
    Ok(())
}

fn header_value(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::configuration(format!("Invalid header value: {}", e)))
}

fn query_pairs(value: Value) -> ClientResult<Vec<(String, String)>> {
    let object = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(object) => object,
        other => {
            return Err(ClientError::Serialization {
                message: format!(
                    "request for a bodyless method must be an object, got {}",
                    json_kind(&other)
                ),
            })
        }
    };

    let mut pairs = Vec::new();
    for (name, value) in object {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((name.clone(), scalar(&name, item)?));
                }
            }
            other => {
                let text = scalar(&name, other)?;
                pairs.push((name, text));
            }
        }
    }
    Ok(pairs)
}

fn scalar(name: &str, value: Value) -> ClientResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ClientError::Serialization {
            message: format!(
                "query parameter '{}' must be a scalar, got {}",
                name,
                json_kind(&other)
            ),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
