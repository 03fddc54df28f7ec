//! Error types for the resilient client.

use crate::errors::categories::{CancelReason, ErrorCategory, TransportErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Main error type for the client.
///
/// Every terminal failure of a call is reported through this enum. HTTP-level
/// failures carry the status code, and every failure produced by the retry
/// loop carries the number of attempts that were made, so callers can tell
/// exhaustion-after-retry apart from a first-attempt rejection.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Configuration error (invalid settings, URL or header)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Path template could not be rendered with the supplied parameters
    #[error("Template error in '{template}': {message}")]
    Template {
        /// The offending path template
        template: String,
        /// What went wrong while binding parameters
        message: String,
    },

    /// The typed request could not be encoded
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message from the encoder
        message: String,
    },

    /// Non-retryable HTTP status (4xx except retryable codes)
    #[error("Permanent failure (HTTP {status}) after {attempts} attempt(s): {message}")]
    Permanent {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
        /// Raw response body, if it was valid UTF-8
        body: Option<String>,
        /// Number of attempts made
        attempts: u32,
    },

    /// A success response whose body did not match the declared response type
    #[error("Malformed response (HTTP {status}) after {attempts} attempt(s): {message}")]
    Decode {
        /// HTTP status code of the response
        status: u16,
        /// Decoder error message
        message: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Retryable HTTP status (5xx, 429, or a configured code)
    #[error("Retryable failure (HTTP {status}) after {attempts} attempt(s): {message}")]
    Retryable {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
        /// Server supplied Retry-After hint
        retry_after: Option<Duration>,
        /// Number of attempts made
        attempts: u32,
    },

    /// Connection-level failure (refused, timed out, DNS)
    #[error("Transport failure ({kind}) after {attempts} attempt(s): {message}")]
    Transport {
        /// Kind of transport failure
        kind: TransportErrorKind,
        /// Error message
        message: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Circuit breaker rejected the call before any attempt was made
    #[error("Circuit breaker open: failing fast")]
    CircuitOpen {
        /// Time until the breaker will admit a probe
        retry_in: Option<Duration>,
    },

    /// The call was cancelled or its deadline passed
    #[error("Call cancelled: {reason}")]
    Cancelled {
        /// Why the call stopped
        reason: CancelReason,
    },
}

impl ClientError {
    /// Returns true if the retry loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Retryable { .. } | ClientError::Transport { .. }
        )
    }

    /// Returns true for failures that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ClientError::Permanent { .. } | ClientError::Decode { .. }
        )
    }

    /// Returns true if the circuit breaker should count this as a failed call.
    ///
    /// Only classified attempt outcomes count. Caller bugs, cancellations and
    /// fast-fail rejections say nothing about downstream health.
    pub fn counts_as_failure(&self) -> bool {
        self.is_retryable() || self.is_permanent()
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Permanent { status, .. }
            | ClientError::Decode { status, .. }
            | ClientError::Retryable { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Number of attempts made before this error surfaced.
    ///
    /// Zero for errors raised before any network call.
    pub fn attempts(&self) -> u32 {
        match self {
            ClientError::Permanent { attempts, .. }
            | ClientError::Decode { attempts, .. }
            | ClientError::Retryable { attempts, .. }
            | ClientError::Transport { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Returns the retry-after duration if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::Retryable { retry_after, .. } => *retry_after,
            ClientError::CircuitOpen { retry_in } => *retry_in,
            _ => None,
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Configuration { .. } => ErrorCategory::Configuration,
            ClientError::Template { .. } => ErrorCategory::Template,
            ClientError::Serialization { .. } => ErrorCategory::Serialization,
            ClientError::Permanent { .. } => ErrorCategory::Permanent,
            ClientError::Decode { .. } => ErrorCategory::Decode,
            ClientError::Retryable { .. } => ErrorCategory::Retryable,
            ClientError::Transport { .. } => ErrorCategory::Transport,
            ClientError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            ClientError::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Stamp the attempt count onto an attempt-level error.
    pub(crate) fn with_attempts(mut self, count: u32) -> Self {
        match &mut self {
            ClientError::Permanent { attempts, .. }
            | ClientError::Decode { attempts, .. }
            | ClientError::Retryable { attempts, .. }
            | ClientError::Transport { attempts, .. } => *attempts = count,
            _ => {}
        }
        self
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ClientError::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Template {
            template: template.into(),
            message: message.into(),
        }
    }
}

// Conversions from common error types
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        ClientError::Transport {
            kind,
            message: err.to_string(),
            attempts: 0,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
