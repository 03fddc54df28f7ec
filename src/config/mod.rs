//! Configuration module for the resilient client.
//!
//! Provides the client-wide defaults: base URL, default headers, the
//! per-attempt timeout, and the retry, circuit breaker and rate limit
//! settings. Per-call overrides live in [`crate::CallOptions`].

use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ClientError, ClientResult};
use crate::observability::redact_headers;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the circuit stays open.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default token bucket capacity.
pub const DEFAULT_RATE_LIMIT_CAPACITY: u32 = 10;

/// Default token refill rate per second.
pub const DEFAULT_RATE_LIMIT_REFILL_RATE: f64 = 1.0;

/// Prefix for environment variables read by [`ClientConfig::from_env`].
pub const ENV_PREFIX: &str = "CLIENTRY_";

/// Configuration for the resilient client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Headers sent with every request.
    pub default_headers: Vec<(String, String)>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// User agent sent by the default transport.
    pub user_agent: String,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limit settings.
    pub rate_limit: RateLimitConfig,
    /// Whether the circuit breaker guards calls.
    pub enable_circuit_breaker: bool,
    /// Whether calls are rate limited.
    pub enable_rate_limit: bool,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CLIENTRY_BASE_URL` (required): Base URL
    /// - `CLIENTRY_TIMEOUT_SECS` (optional): Per-attempt timeout in seconds
    /// - `CLIENTRY_MAX_RETRY_ATTEMPTS` (optional): Retries after the first attempt
    /// - `CLIENTRY_FAILURE_THRESHOLD` (optional): Failures before the circuit opens
    /// - `CLIENTRY_RECOVERY_TIMEOUT_SECS` (optional): Seconds the circuit stays open
    /// - `CLIENTRY_RATE_LIMIT_CAPACITY` (optional): Token bucket capacity
    /// - `CLIENTRY_RATE_LIMIT_REFILL_RATE` (optional): Tokens added per second
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        let base_url = var("BASE_URL").ok_or_else(|| {
            ClientError::configuration(format!(
                "{}BASE_URL environment variable not set",
                ENV_PREFIX
            ))
        })?;

        let mut builder = ClientConfigBuilder::new().base_url(base_url);

        if let Some(secs) = parse_var::<f64>("TIMEOUT_SECS", var("TIMEOUT_SECS"))? {
            builder = builder.timeout(secs_to_duration("TIMEOUT_SECS", secs)?);
        }
        if let Some(attempts) = parse_var("MAX_RETRY_ATTEMPTS", var("MAX_RETRY_ATTEMPTS"))? {
            builder = builder.max_retry_attempts(attempts);
        }
        if let Some(threshold) = parse_var("FAILURE_THRESHOLD", var("FAILURE_THRESHOLD"))? {
            builder = builder.failure_threshold(threshold);
        }
        if let Some(secs) = parse_var::<f64>("RECOVERY_TIMEOUT_SECS", var("RECOVERY_TIMEOUT_SECS"))? {
            builder = builder.recovery_timeout(secs_to_duration("RECOVERY_TIMEOUT_SECS", secs)?);
        }
        if let Some(capacity) = parse_var("RATE_LIMIT_CAPACITY", var("RATE_LIMIT_CAPACITY"))? {
            builder = builder.rate_limit_capacity(capacity);
        }
        if let Some(rate) = parse_var("RATE_LIMIT_REFILL_RATE", var("RATE_LIMIT_REFILL_RATE"))? {
            builder = builder.rate_limit_refill_rate(rate);
        }

        builder.build()
    }

    /// Checks every setting.
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::configuration(
                "Base URL must start with http:// or https://",
            ));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ClientError::configuration("Base URL must include a host"));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::configuration("Timeout must be greater than zero"));
        }

        let retry = &self.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ClientError::configuration(
                "Backoff multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ClientError::configuration("Jitter must be between 0.0 and 1.0"));
        }
        if retry.base_delay > retry.max_delay {
            return Err(ClientError::configuration(
                "Base delay must not exceed max delay",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ClientError::configuration(
                "Failure threshold must be at least 1",
            ));
        }

        if self.rate_limit.capacity == 0 {
            return Err(ClientError::configuration(
                "Rate limit capacity must be at least 1",
            ));
        }
        if !self.rate_limit.refill_rate.is_finite() || self.rate_limit.refill_rate <= 0.0 {
            return Err(ClientError::configuration(
                "Rate limit refill rate must be a positive number",
            ));
        }

        for (name, value) in &self.default_headers {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ClientError::configuration(format!("Invalid header name '{}': {}", name, e))
            })?;
            http::HeaderValue::from_str(value).map_err(|e| {
                ClientError::configuration(format!("Invalid value for header '{}': {}", name, e))
            })?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("default_headers", &redact_headers(&self.default_headers))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limit", &self.rate_limit)
            .field("enable_circuit_breaker", &self.enable_circuit_breaker)
            .field("enable_rate_limit", &self.enable_rate_limit)
            .finish()
    }
}

fn parse_var<T: FromStr>(name: &str, value: Option<String>) -> ClientResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ClientError::configuration(format!(
                "Invalid value for {}{}: '{}'",
                ENV_PREFIX, name, raw
            ))
        }),
    }
}

fn secs_to_duration(name: &str, secs: f64) -> ClientResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ClientError::configuration(format!("Invalid value for {}{}: {}", ENV_PREFIX, name, secs))
    })
}

/// Builder for `ClientConfig`.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    default_headers: Vec<(String, String)>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    retry: Option<RetryConfig>,
    max_retry_attempts: Option<u32>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    failure_threshold: Option<u32>,
    recovery_timeout: Option<Duration>,
    rate_limit_capacity: Option<u32>,
    rate_limit_refill_rate: Option<f64>,
    enable_circuit_breaker: Option<bool>,
    enable_rate_limit: Option<bool>,
}

impl ClientConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a default header.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Replaces the whole retry configuration.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    /// Replaces the whole circuit breaker configuration.
    pub fn circuit_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Sets the recovery timeout.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = Some(timeout);
        self
    }

    /// Sets the token bucket capacity.
    pub fn rate_limit_capacity(mut self, capacity: u32) -> Self {
        self.rate_limit_capacity = Some(capacity);
        self
    }

    /// Sets the token refill rate per second.
    pub fn rate_limit_refill_rate(mut self, rate: f64) -> Self {
        self.rate_limit_refill_rate = Some(rate);
        self
    }

    /// Enables or disables the circuit breaker.
    pub fn enable_circuit_breaker(mut self, enabled: bool) -> Self {
        self.enable_circuit_breaker = Some(enabled);
        self
    }

    /// Enables or disables rate limiting.
    pub fn enable_rate_limit(mut self, enabled: bool) -> Self {
        self.enable_rate_limit = Some(enabled);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// Flat options such as `max_retry_attempts` are applied on top of a
    /// replaced sub-configuration.
    pub fn build(self) -> ClientResult<ClientConfig> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::configuration("Base URL is required"))?
            .trim_end_matches('/')
            .to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::configuration(
                "Base URL must start with http:// or https://",
            ));
        }

        let mut retry = self
            .retry
            .unwrap_or_else(|| RetryConfig::new().with_max_attempts(DEFAULT_MAX_RETRY_ATTEMPTS));
        if let Some(attempts) = self.max_retry_attempts {
            retry.max_attempts = attempts;
        }

        let mut circuit_breaker = self.circuit_breaker.unwrap_or_else(|| {
            CircuitBreakerConfig::new()
                .with_failure_threshold(DEFAULT_FAILURE_THRESHOLD)
                .with_recovery_timeout(DEFAULT_RECOVERY_TIMEOUT)
        });
        if let Some(threshold) = self.failure_threshold {
            circuit_breaker.failure_threshold = threshold;
        }
        if let Some(timeout) = self.recovery_timeout {
            circuit_breaker.recovery_timeout = timeout;
        }

        let rate_limit = RateLimitConfig::new(
            self.rate_limit_capacity.unwrap_or(DEFAULT_RATE_LIMIT_CAPACITY),
            self.rate_limit_refill_rate
                .unwrap_or(DEFAULT_RATE_LIMIT_REFILL_RATE),
        );

        let config = ClientConfig {
            base_url,
            default_headers: self.default_headers,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| crate::DEFAULT_USER_AGENT.to_string()),
            retry,
            circuit_breaker,
            rate_limit,
            enable_circuit_breaker: self.enable_circuit_breaker.unwrap_or(true),
            enable_rate_limit: self.enable_rate_limit.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
