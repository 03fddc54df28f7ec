//! Observability module for logging and metrics.

mod logging;
mod metrics;

pub use logging::{
    is_sensitive_header, redact_header_map, redact_headers, LogFormat, LogLevel, LoggingConfig,
};
pub use metrics::{
    Counter, Histogram, InMemoryMetricsCollector, MetricsCollector, MetricsSnapshot,
    NoopMetricsCollector,
};
