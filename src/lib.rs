//! # clientry
//!
//! Generic typed HTTP request client with built-in resilience.
//!
//! ## Features
//!
//! - Endpoints bind a path template and method to request/response types at compile time
//! - Retry with exponential backoff, optional jitter and `Retry-After` support
//! - Circuit breaker with lazy recovery and single half-open probe
//! - Token bucket rate limiting shared by concurrent callers
//! - Per-call overrides: path parameters, headers, query, retry ceiling, timeout,
//!   deadline and cancellation
//! - JSON, raw and multipart request bodies
//! - Structured logging with `tracing` and in-memory metrics
//! - Scriptable mock transport for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clientry::{ClientConfig, Endpoint, ResilientClient};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct EchoRequest {
//!     x: i32,
//! }
//!
//! #[derive(Deserialize)]
//! struct EchoResponse {
//!     x: i32,
//! }
//!
//! const ECHO: Endpoint<EchoRequest, EchoResponse> = Endpoint::post("/echo");
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://httpbin.org")
//!         .max_retry_attempts(2)
//!         .build()?;
//!
//!     let client = ResilientClient::new(config)?;
//!     let response = client.send(&ECHO, EchoRequest { x: 1 }).await?;
//!     assert_eq!(response.x, 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `client` - The resilient client and its builder
//! - `config` - Configuration types and builder
//! - `endpoint` - Typed endpoint descriptors and path templates
//! - `request` - Request payloads and per-call options
//! - `executor` - Single-attempt execution and outcome classification
//! - `transport` - HTTP transport layer
//! - `errors` - Error types and taxonomy
//! - `types` - Common request/response helper types
//! - `resilience` - Retry, circuit breaker, rate limiting
//! - `observability` - Logging and metrics
//! - `mocks` - Mock transport for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod executor;
pub mod mocks;
pub mod observability;
pub mod request;
pub mod resilience;
pub mod transport;
pub mod types;

pub use client::{ResilientClient, ResilientClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use endpoint::Endpoint;
pub use errors::{CancelReason, ClientError, ClientResult, ErrorCategory, TransportErrorKind};
pub use executor::{AttemptOutcome, RequestExecutor};
pub use observability::{
    InMemoryMetricsCollector, LogFormat, LogLevel, LoggingConfig, MetricsCollector,
    MetricsSnapshot, NoopMetricsCollector,
};
pub use request::{CallOptions, FilePart, MultipartForm, Payload, Request};
pub use resilience::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, FailureCountPolicy,
    RateLimitConfig, RateLimiter, RetryConfig, RetryDecision, RetryPolicy,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, WireBody,
};
pub use types::{EmptyRequest, Extra, Ignored};

/// User agent sent by the default transport
pub const DEFAULT_USER_AGENT: &str = concat!("clientry/", env!("CARGO_PKG_VERSION"));

/// Convenience re-exports for typical use.
pub mod prelude {
    pub use crate::client::ResilientClient;
    pub use crate::config::ClientConfig;
    pub use crate::endpoint::Endpoint;
    pub use crate::errors::{ClientError, ClientResult};
    pub use crate::request::{CallOptions, Request};
    pub use crate::types::EmptyRequest;
}
