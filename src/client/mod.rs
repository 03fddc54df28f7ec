//! The resilient client.
//!
//! [`ResilientClient::execute`] wraps one logical call with the circuit
//! breaker, the rate limiter and the retry loop:
//!
//! 1. the request is prepared (template, encoding, headers) before any
//!    admission, so caller mistakes never touch the breaker;
//! 2. the breaker admits or rejects the call;
//! 3. the rate limiter hands out one token per call, possibly waiting;
//! 4. attempts run until the retry policy says stop;
//! 5. the breaker records the call's final outcome.
//!
//! Cancellation and deadlines from [`CallOptions`] are observed at the rate
//! limiter wait, the in-flight request and every backoff sleep. Dropping the
//! returned future also gives back a half-open probe slot.

mod guard;

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::errors::{ClientError, ClientResult};
use crate::executor::{header_map, RequestExecutor};
use crate::observability::{InMemoryMetricsCollector, MetricsCollector, MetricsSnapshot};
use crate::request::{CallOptions, Request};
use crate::resilience::{
    Admission, CircuitBreaker, CircuitBreakerHook, JitterSource, RateLimiter, RetryDecision,
    RetryPolicy,
};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};
use guard::{AdmissionPermit, CallGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

/// Typed HTTP client with retry, circuit breaking and rate limiting.
///
/// The breaker and limiter belong to this instance; clones of the `Arc`
/// around a client share them, separate clients never do.
pub struct ResilientClient {
    config: Arc<ClientConfig>,
    executor: RequestExecutor,
    retry_policy: RetryPolicy,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    metrics: Arc<dyn MetricsCollector>,
}

impl ResilientClient {
    /// Create a client using the default reqwest transport.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::builder(config).build()
    }

    /// Create a client on top of a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> ClientResult<Self> {
        Self::builder(config).transport(transport).build()
    }

    /// Create a client from `CLIENTRY_*` environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Start building a client.
    pub fn builder(config: ClientConfig) -> ResilientClientBuilder {
        ResilientClientBuilder::new(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The circuit breaker, if enabled.
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// The rate limiter, if enabled.
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// The client-wide retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Snapshot of call metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Call `endpoint` with default options.
    pub async fn send<Req, Resp>(
        &self,
        endpoint: &Endpoint<Req, Resp>,
        request: impl Into<Request<Req>>,
    ) -> ClientResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.execute(endpoint, request, CallOptions::default()).await
    }

    /// Call `endpoint`, retrying and guarding as configured.
    ///
    /// # Errors
    ///
    /// - `Template`, `Serialization` or `Configuration` before any admission.
    /// - `CircuitOpen` when the breaker rejects the call; nothing is sent.
    /// - `Cancelled` when the token fires or the deadline passes.
    /// - The final `Permanent`, `Decode`, `Retryable` or `Transport` error,
    ///   carrying the number of attempts made.
    pub async fn execute<Req, Resp>(
        &self,
        endpoint: &Endpoint<Req, Resp>,
        request: impl Into<Request<Req>>,
        options: CallOptions,
    ) -> ClientResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let request = request.into();
        let span = info_span!(
            "call",
            call_id = %Uuid::new_v4(),
            method = %endpoint.method(),
            path = %endpoint.path(),
        );

        async move {
            let label = endpoint.to_string();
            let started = Instant::now();
            self.metrics.record_call(&label);

            let result = self.call(endpoint, &request, &options, &label).await;

            match &result {
                Ok(_) => {
                    self.metrics.record_success(&label, started.elapsed());
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Call succeeded");
                }
                Err(e) => {
                    self.metrics.record_failure(&label, e.category());
                    debug!(error = %e, attempts = e.attempts(), "Call failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn call<Req, Resp>(
        &self,
        endpoint: &Endpoint<Req, Resp>,
        request: &Request<Req>,
        options: &CallOptions,
        label: &str,
    ) -> ClientResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let guard = CallGuard::new(options);
        guard.check()?;

        let prepared = self.executor.prepare(endpoint, request, options)?;

        let permit = match self.circuit_breaker.as_deref() {
            Some(breaker) => match breaker.admit() {
                Admission::Rejected { retry_in } => {
                    self.metrics.record_circuit_rejection(label);
                    return Err(ClientError::CircuitOpen { retry_in });
                }
                admission => Some(AdmissionPermit::new(breaker, admission)),
            },
            None => None,
        };

        let result = self.admitted(prepared, options, &guard, label).await;

        if let Some(permit) = permit {
            permit.settle(&result);
        }
        result
    }

    async fn admitted<Resp>(
        &self,
        prepared: HttpRequest,
        options: &CallOptions,
        guard: &CallGuard,
        label: &str,
    ) -> ClientResult<Resp>
    where
        Resp: DeserializeOwned,
    {
        if let Some(limiter) = &self.rate_limiter {
            let waited = guard.run(limiter.acquire()).await?;
            if !waited.is_zero() {
                self.metrics.record_rate_limit_wait(label, waited);
            }
        }

        let policy = match options.max_retry_attempts {
            Some(max_attempts) => Cow::Owned(self.retry_policy.with_max_attempts(max_attempts)),
            None => Cow::Borrowed(&self.retry_policy),
        };
        let predicate = options.retryable_status.as_ref();

        let mut attempt = 0u32;
        loop {
            self.metrics.record_attempt(label);
            let outcome = guard
                .run(self.executor.send::<Resp>(prepared.clone(), predicate))
                .await?;

            match policy.next_delay(attempt, &outcome) {
                RetryDecision::Stop => return outcome.into_result(attempt + 1),
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt = attempt + 1,
                        status = ?outcome.status(),
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    self.metrics.record_retry(label, delay);
                    guard.sleep(delay).await?;
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResilientClient`]
pub struct ResilientClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
    jitter: Option<Arc<dyn JitterSource>>,
    hook: Option<Arc<dyn CircuitBreakerHook>>,
}

impl ResilientClientBuilder {
    /// Create a builder for `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            metrics: None,
            jitter: None,
            hook: None,
        }
    }

    /// Use a custom transport instead of reqwest.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom metrics collector.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Draw retry jitter from `jitter`.
    pub fn jitter_source(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Observe circuit breaker transitions.
    pub fn circuit_breaker_hook(mut self, hook: Arc<dyn CircuitBreakerHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> ClientResult<ResilientClient> {
        let config = self.config;
        config.validate()?;

        let base_url = Url::parse(&config.base_url)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_user_agent(
                config.timeout,
                &config.user_agent,
            )?),
        };

        let executor = RequestExecutor::new(transport, base_url)
            .with_default_headers(header_map(&config.default_headers)?)
            .with_timeout(config.timeout)
            .with_retryable_status(config.retry.retryable_status.clone());

        let retry_policy = match self.jitter {
            Some(jitter) => RetryPolicy::with_jitter_source(config.retry.clone(), jitter),
            None => RetryPolicy::new(config.retry.clone()),
        };

        let hook = self.hook;
        let circuit_breaker = config.enable_circuit_breaker.then(|| {
            let breaker = CircuitBreaker::with_config(config.circuit_breaker.clone());
            Arc::new(match hook {
                Some(hook) => breaker.with_hook(hook),
                None => breaker,
            })
        });

        let rate_limiter = config
            .enable_rate_limit
            .then(|| Arc::new(RateLimiter::new(config.rate_limit.clone())));

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(InMemoryMetricsCollector::new()));

        Ok(ResilientClient {
            config: Arc::new(config),
            executor,
            retry_policy,
            circuit_breaker,
            rate_limiter,
            metrics,
        })
    }
}
