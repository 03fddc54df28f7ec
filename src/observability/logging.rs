//! Logging configuration and header redaction.
//!
//! The client itself only emits `tracing` events; installing a subscriber is
//! left to the application. [`LoggingConfig::init`] is a convenience for
//! applications that have no subscriber of their own.

use crate::errors::{ClientError, ClientResult};
use http::HeaderMap;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level - everything, including per-attempt detail
    Trace,
    /// Debug level - verbose debugging information
    Debug,
    /// Info level - general information
    Info,
    /// Warn level - warnings
    Warn,
    /// Error level - errors
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty printed format for development
    Pretty,
    /// JSON format for production
    Json,
    /// Compact format
    Compact,
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level
    pub level: LogLevel,
    /// Log format
    pub format: LogFormat,
    /// Whether to include target (module path)
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable target
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Create configuration for development
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            include_target: true,
        }
    }

    /// Create configuration for production
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            include_target: false,
        }
    }

    /// Install a global subscriber. `RUST_LOG` directives are honoured on top
    /// of the configured level.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a global subscriber is already set.
    pub fn init(self) -> ClientResult<()> {
        let level = LevelFilter::from_level(self.level.into());
        let filter = EnvFilter::from_default_env().add_directive(level.into());
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Pretty => registry
                .with(fmt::layer().pretty().with_target(self.include_target))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_target(self.include_target))
                .try_init(),
            LogFormat::Compact => registry
                .with(fmt::layer().compact().with_target(self.include_target))
                .try_init(),
        };

        result.map_err(|e| ClientError::configuration(format!("Failed to install logger: {}", e)))
    }
}

const SENSITIVE: [&str; 7] = [
    "authorization",
    "api-key",
    "api_key",
    "token",
    "secret",
    "password",
    "cookie",
];

const REDACTED: &str = "[REDACTED]";

/// Returns true for header names that usually carry credentials.
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE.iter().any(|s| lower.contains(s))
}

/// Copy of `headers` with credential-like values replaced.
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive_header(name) {
                (name.clone(), REDACTED.to_string())
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Printable form of a header map with credential-like values replaced.
pub fn redact_header_map(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if is_sensitive_header(name.as_str()) {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_logging_config() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Debug)
            .with_format(LogFormat::Json);

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_presets() {
        let dev = LoggingConfig::development();
        assert_eq!(dev.level, LogLevel::Debug);
        assert!(dev.include_target);

        let prod = LoggingConfig::production();
        assert_eq!(prod.level, LogLevel::Info);
        assert_eq!(prod.format, LogFormat::Json);
    }

    #[test]
    fn test_redact_headers() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("X-Api-Key".to_string(), "k".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let redacted = redact_headers(&headers);

        assert_eq!(redacted[0].1, "[REDACTED]");
        assert_eq!(redacted[1].1, "[REDACTED]");
        assert_eq!(redacted[2].1, "application/json");
    }

    #[test]
    fn test_redact_header_map() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-token", HeaderValue::from_static("t"));
        let redacted = redact_header_map(&headers);
        assert_eq!(
            redacted,
            vec![("x-session-token".to_string(), "[REDACTED]".to_string())]
        );
    }
}
