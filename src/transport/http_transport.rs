//! HTTP transport implementations.

use super::{HttpRequest, HttpResponse, WireBody};
use crate::errors::{ClientError, ClientResult};
use crate::request::MultipartForm;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// HTTP transport trait: one request in, one response out.
///
/// Implementations return `Ok` for every HTTP response regardless of status
/// and `Err` only for connection-level failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a single HTTP exchange.
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

/// Reqwest-based HTTP transport implementation
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new reqwest transport
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        Self::with_user_agent(timeout, crate::DEFAULT_USER_AGENT)
    }

    /// Create a new reqwest transport sending the given user agent
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Create a new reqwest transport with custom client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_form(form: MultipartForm) -> ClientResult<reqwest::multipart::Form> {
        let mut multipart = reqwest::multipart::Form::new();
        for (name, value) in form.fields {
            multipart = multipart.text(name, value);
        }
        for file in form.files {
            let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
                .file_name(file.file_name)
                .mime_str(file.mime.as_ref())
                .map_err(|e| ClientError::Configuration {
                    message: format!("Invalid MIME type: {}", e),
                })?;
            multipart = multipart.part(file.field, part);
        }
        Ok(multipart)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method.into(), url);

        match body {
            WireBody::Empty => {}
            WireBody::Bytes { data, content_type } => {
                if let Some(content_type) = content_type {
                    if !headers.contains_key(http::header::CONTENT_TYPE) {
                        if let Ok(value) = http::HeaderValue::from_str(&content_type) {
                            headers.insert(http::header::CONTENT_TYPE, value);
                        }
                    }
                }
                builder = builder.body(data);
            }
            WireBody::Multipart(form) => {
                // Multipart sets its own boundary
                headers.remove(http::header::CONTENT_TYPE);
                builder = builder.multipart(Self::build_form(form)?);
            }
        }

        builder = builder.headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
