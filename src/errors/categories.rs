//! Error categories and failure detail kinds for the client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category for classification, metrics and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Client configuration errors
    Configuration,
    /// Path template binding errors
    Template,
    /// Request encoding errors
    Serialization,
    /// Non-retryable HTTP status
    Permanent,
    /// Response body did not decode
    Decode,
    /// Retryable HTTP status
    Retryable,
    /// Network connectivity issues
    Transport,
    /// Circuit breaker fast-fail
    CircuitOpen,
    /// Cancellation or deadline
    Cancelled,
}

impl ErrorCategory {
    /// Check if errors in this category are retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Retryable | ErrorCategory::Transport)
    }

    /// Get a human-readable description of this category
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "Configuration error",
            ErrorCategory::Template => "Path template error",
            ErrorCategory::Serialization => "Serialization error",
            ErrorCategory::Permanent => "Permanent failure",
            ErrorCategory::Decode => "Malformed response",
            ErrorCategory::Retryable => "Retryable failure",
            ErrorCategory::Transport => "Transport failure",
            ErrorCategory::CircuitOpen => "Circuit open",
            ErrorCategory::Cancelled => "Cancelled",
        }
    }

    /// Stable label used for metrics keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Template => "template",
            ErrorCategory::Serialization => "serialization",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Retryable => "retryable",
            ErrorCategory::Transport => "transport",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Cancelled => "cancelled",
        }
    }
}

/// Kind of connection-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request or connection timed out
    Timeout,
    /// The connection could not be established (refused, DNS)
    Connect,
    /// The body could not be sent or read
    Body,
    /// The request could not be built or sent
    Request,
    /// Anything else
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Why a call was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The caller's cancellation token fired
    Token,
    /// The call's deadline passed
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Token => f.write_str("cancellation requested"),
            CancelReason::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Retryable.is_retryable());
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::Permanent.is_retryable());
        assert!(!ErrorCategory::Decode.is_retryable());
        assert!(!ErrorCategory::CircuitOpen.is_retryable());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ErrorCategory::CircuitOpen.as_str(), "circuit_open");
        let json = serde_json::to_string(&ErrorCategory::CircuitOpen).unwrap();
        assert_eq!(json, "\"circuit_open\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(CancelReason::Deadline.to_string(), "deadline exceeded");
    }
}
