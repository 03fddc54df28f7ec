//! Retry policy with exponential backoff.

use crate::executor::AttemptOutcome;
use crate::request::StatusPredicate;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = exactly one attempt)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter fraction (0.0 to 1.0) applied multiplicatively to each delay
    pub jitter: f64,
    /// Use the server's Retry-After hint when present
    pub respect_retry_after: bool,
    /// Override for which statuses are retryable
    pub retryable_status: Option<StatusPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.0,
            respect_retry_after: true,
            retryable_status: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the first attempt
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the jitter fraction
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Enable or disable honouring Retry-After
    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Replace the retryable-status set
    pub fn with_retryable_status<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.retryable_status = Some(Arc::new(predicate));
        self
    }

    /// Backoff delay before retry number `attempt_index + 1`, without jitter.
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        cap(delay, self.max_delay)
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("respect_retry_after", &self.respect_retry_after)
            .field("retryable_status", &self.retryable_status.is_some())
            .finish()
    }
}

fn cap(seconds: f64, max: Duration) -> Duration {
    if !seconds.is_finite() || seconds >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Source of uniform random samples in `[0, 1)` for jitter.
pub trait JitterSource: Send + Sync {
    /// Next sample in `[0, 1)`.
    fn sample(&self) -> f64;
}

/// Jitter from the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Reproducible jitter from a seeded generator.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

/// Jitter that always returns the same sample.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Decision returned by [`RetryPolicy::next_delay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// The outcome just observed is final
    Stop,
}

/// Decides whether and when to retry.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    jitter: Arc<dyn JitterSource>,
}

impl RetryPolicy {
    /// Create a policy drawing jitter from the thread-local generator.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_jitter_source(config, Arc::new(ThreadRngJitter))
    }

    /// Create a policy with an injected jitter source.
    pub fn with_jitter_source(config: RetryConfig, jitter: Arc<dyn JitterSource>) -> Self {
        Self { config, jitter }
    }

    /// The policy's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Copy of this policy with a different retry ceiling.
    ///
    /// Every other parameter is kept.
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        let mut policy = self.clone();
        policy.config.max_attempts = max_attempts;
        policy
    }

    /// Decide what to do after the attempt at `attempt_index` (0-based) ended with `outcome`.
    pub fn next_delay<T>(&self, attempt_index: u32, outcome: &AttemptOutcome<T>) -> RetryDecision {
        let error = match outcome {
            AttemptOutcome::Success(_) | AttemptOutcome::PermanentFailure(_) => {
                return RetryDecision::Stop
            }
            AttemptOutcome::RetryableFailure(e) | AttemptOutcome::TransportFailure(e) => e,
        };

        if attempt_index >= self.config.max_attempts {
            return RetryDecision::Stop;
        }

        if self.config.respect_retry_after {
            if let Some(hint) = error.retry_after() {
                return RetryDecision::Retry(hint.min(self.config.max_delay));
            }
        }

        RetryDecision::Retry(self.jittered(self.config.backoff(attempt_index)))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return delay;
        }
        let spread = self.config.jitter * (2.0 * self.jitter.sample() - 1.0);
        cap(delay.as_secs_f64() * (1.0 + spread), self.config.max_delay)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ClientError, TransportErrorKind};

    fn retryable(retry_after: Option<Duration>) -> AttemptOutcome<()> {
        AttemptOutcome::RetryableFailure(ClientError::Retryable {
            status: 503,
            message: "Service Unavailable".to_string(),
            retry_after,
            attempts: 0,
        })
    }

    fn permanent() -> AttemptOutcome<()> {
        AttemptOutcome::PermanentFailure(ClientError::Permanent {
            status: 404,
            message: "Not Found".to_string(),
            body: None,
            attempts: 0,
        })
    }

    fn transport() -> AttemptOutcome<()> {
        AttemptOutcome::TransportFailure(ClientError::Transport {
            kind: TransportErrorKind::Connect,
            message: "refused".to_string(),
            attempts: 0,
        })
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.jitter, 0.0);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_secs(1));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_permanent_always_stops() {
        let policy = RetryPolicy::new(RetryConfig::new().with_max_attempts(10));
        for attempt in 0..10 {
            assert_eq!(policy.next_delay(attempt, &permanent()), RetryDecision::Stop);
        }
    }

    #[test]
    fn test_retryable_stops_at_ceiling() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(100)),
        );

        assert_eq!(
            policy.next_delay(0, &retryable(None)),
            RetryDecision::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            policy.next_delay(1, &transport()),
            RetryDecision::Retry(Duration::from_millis(200))
        );
        assert_eq!(policy.next_delay(2, &retryable(None)), RetryDecision::Stop);
    }

    #[test]
    fn test_zero_attempts_never_waits() {
        let policy = RetryPolicy::new(RetryConfig::new().with_max_attempts(0));
        assert_eq!(policy.next_delay(0, &retryable(None)), RetryDecision::Stop);
        assert_eq!(policy.next_delay(0, &transport()), RetryDecision::Stop);
    }

    #[test]
    fn test_retry_after_respected_and_capped() {
        let policy = RetryPolicy::new(
            RetryConfig::new().with_max_delay(Duration::from_secs(5)),
        );
        assert_eq!(
            policy.next_delay(0, &retryable(Some(Duration::from_secs(2)))),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert_eq!(
            policy.next_delay(0, &retryable(Some(Duration::from_secs(120)))),
            RetryDecision::Retry(Duration::from_secs(5))
        );

        let ignoring = RetryPolicy::new(RetryConfig::new().with_respect_retry_after(false));
        assert_eq!(
            ignoring.next_delay(0, &retryable(Some(Duration::from_secs(2)))),
            RetryDecision::Retry(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_jitter_is_multiplicative() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_jitter(0.5);

        let low = RetryPolicy::with_jitter_source(config.clone(), Arc::new(FixedJitter(0.0)));
        assert_eq!(
            low.next_delay(0, &retryable(None)),
            RetryDecision::Retry(Duration::from_millis(500))
        );

        let high = RetryPolicy::with_jitter_source(config, Arc::new(FixedJitter(0.75)));
        assert_eq!(
            high.next_delay(0, &retryable(None)),
            RetryDecision::Retry(Duration::from_millis(1250))
        );
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let config = RetryConfig::new().with_jitter(0.3);
        let a = RetryPolicy::with_jitter_source(config.clone(), Arc::new(SeededJitter::new(42)));
        let b = RetryPolicy::with_jitter_source(config, Arc::new(SeededJitter::new(42)));

        for attempt in 0..3 {
            let first = a.next_delay(attempt, &retryable(None));
            assert_eq!(first, b.next_delay(attempt, &retryable(None)));
            if let RetryDecision::Retry(delay) = first {
                let base = Duration::from_millis(500 * 2u64.pow(attempt)).as_secs_f64();
                assert!(delay.as_secs_f64() >= base * 0.7 - 1e-9);
                assert!(delay.as_secs_f64() <= base * 1.3 + 1e-9);
            }
        }
    }

    #[test]
    fn test_override_keeps_other_parameters() {
        let policy = RetryPolicy::new(
            RetryConfig::new()
                .with_max_attempts(5)
                .with_base_delay(Duration::from_millis(10)),
        );
        let single = policy.with_max_attempts(0);

        assert_eq!(single.config().max_attempts, 0);
        assert_eq!(single.config().base_delay, Duration::from_millis(10));
        assert_eq!(policy.config().max_attempts, 5);
    }
}
