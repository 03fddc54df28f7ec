//! Resilience patterns for the client.
//!
//! This module provides:
//! - Retry policy with exponential backoff and optional jitter
//! - Circuit breaker with lazy recovery and single-probe admission
//! - Token-bucket rate limiting

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitBreakerMetrics,
    CircuitState, FailureCountPolicy,
};
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterMetrics};
pub use retry::{
    FixedJitter, JitterSource, RetryConfig, RetryDecision, RetryPolicy, SeededJitter,
    ThreadRngJitter,
};
