//! Tests for resilience patterns.

use clientry::errors::{ClientError, TransportErrorKind};
use clientry::executor::AttemptOutcome;
use clientry::resilience::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerHook, CircuitState,
    FailureCountPolicy, RateLimitConfig, RateLimiter, RetryConfig, RetryDecision, RetryPolicy,
    SeededJitter,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;
use tokio::time::Instant;

fn retryable() -> AttemptOutcome<()> {
    AttemptOutcome::RetryableFailure(ClientError::Retryable {
        status: 503,
        message: "Service Unavailable".to_string(),
        retry_after: None,
        attempts: 0,
    })
}

fn permanent() -> AttemptOutcome<()> {
    AttemptOutcome::PermanentFailure(ClientError::Permanent {
        status: 400,
        message: "Bad Request".to_string(),
        body: None,
        attempts: 0,
    })
}

fn transport() -> AttemptOutcome<()> {
    AttemptOutcome::TransportFailure(ClientError::Transport {
        kind: TransportErrorKind::Connect,
        message: "connection refused".to_string(),
        attempts: 0,
    })
}

fn failed() -> Result<(), ClientError> {
    Err(ClientError::Retryable {
        status: 500,
        message: "Internal Server Error".to_string(),
        retry_after: None,
        attempts: 1,
    })
}

#[test_case(0 ; "first attempt")]
#[test_case(1 ; "second attempt")]
#[test_case(10 ; "far past the limit")]
fn test_permanent_failure_always_stops(attempt_index: u32) {
    let policy = RetryPolicy::new(RetryConfig::new().with_max_attempts(5));
    assert_eq!(policy.next_delay(attempt_index, &permanent()), RetryDecision::Stop);
}

#[test]
fn test_backoff_grows_and_caps() {
    let policy = RetryPolicy::new(
        RetryConfig::new()
            .with_max_attempts(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500)),
    );

    let delays: Vec<_> = (0..5)
        .map(|i| match policy.next_delay(i, &retryable()) {
            RetryDecision::Retry(delay) => delay.as_millis(),
            RetryDecision::Stop => panic!("stopped at {}", i),
        })
        .collect();

    assert_eq!(delays, vec![100, 200, 400, 500, 500]);
}

#[test]
fn test_retry_budget_counts_attempts() {
    let policy = RetryPolicy::new(RetryConfig::new().with_max_attempts(2));

    let mut attempts = 1;
    while let RetryDecision::Retry(_) = policy.next_delay(attempts - 1, &transport()) {
        attempts += 1;
    }
    assert_eq!(attempts, 3);

    let no_retry = RetryPolicy::new(RetryConfig::new().with_max_attempts(0));
    assert_eq!(no_retry.next_delay(0, &retryable()), RetryDecision::Stop);
}

#[test]
fn test_seeded_jitter_is_reproducible() {
    let config = RetryConfig::new()
        .with_max_attempts(5)
        .with_base_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(60))
        .with_jitter(0.25);

    let run = || {
        let policy = RetryPolicy::with_jitter_source(config.clone(), Arc::new(SeededJitter::new(7)));
        (0..4)
            .map(|i| policy.next_delay(i, &retryable()))
            .collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(first, run());
    for (i, decision) in first.iter().enumerate() {
        let RetryDecision::Retry(delay) = decision else {
            panic!("expected retry");
        };
        let nominal = config.backoff(i as u32).as_secs_f64();
        let actual = delay.as_secs_f64();
        assert!(actual >= nominal * 0.75 - 1e-9 && actual <= nominal * 1.25 + 1e-9);
    }
}

#[derive(Default)]
struct RecordingHook {
    transitions: Mutex<Vec<(CircuitState, CircuitState)>>,
    rejections: Mutex<u32>,
}

impl CircuitBreakerHook for RecordingHook {
    fn on_state_change(&self, old_state: CircuitState, new_state: CircuitState) {
        self.transitions.lock().push((old_state, new_state));
    }

    fn on_rejected(&self) {
        *self.rejections.lock() += 1;
    }
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_full_cycle() {
    let hook = Arc::new(RecordingHook::default());
    let breaker = CircuitBreaker::with_config(
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(10)),
    )
    .with_hook(hook.clone());

    for _ in 0..2 {
        assert_eq!(breaker.admit(), Admission::Allowed);
        breaker.record(&failed());
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    breaker.record(&failed());
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(4)).await;
    match breaker.admit() {
        Admission::Rejected { retry_in } => assert_eq!(retry_in, Some(Duration::from_secs(6))),
        other => panic!("unexpected admission: {:?}", other),
    }

    tokio::time::advance(Duration::from_secs(7)).await;
    assert_eq!(breaker.admit(), Admission::Probe);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record(&Ok::<_, ClientError>(()));
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    assert_eq!(
        *hook.transitions.lock(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
    assert_eq!(*hook.rejections.lock(), 1);

    let metrics = breaker.metrics();
    assert_eq!(metrics.total_failures, 3);
    assert_eq!(metrics.total_rejections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_single_probe() {
    let breaker = CircuitBreaker::with_config(
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_secs(1)),
    );
    breaker.record_failure();
    tokio::time::advance(Duration::from_secs(2)).await;

    let probe = breaker.admit();
    assert_eq!(probe, Admission::Probe);
    assert!(!breaker.admit().is_admitted());

    breaker.release(probe);
    assert_eq!(breaker.admit(), Admission::Probe);
}

#[test_case(FailureCountPolicy::ResetOnRecovery, 2 ; "success keeps the count")]
#[test_case(FailureCountPolicy::ResetOnSuccess, 1 ; "success clears the count")]
fn test_failure_count_policy(policy: FailureCountPolicy, expected: u32) {
    let breaker = CircuitBreaker::with_config(
        CircuitBreakerConfig::new()
            .with_failure_threshold(5)
            .with_failure_count_policy(policy),
    );

    breaker.record_failure();
    breaker.record_success();
    breaker.record_failure();

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), expected);
}

#[test]
fn test_cancellation_is_not_a_failure() {
    let breaker = CircuitBreaker::new();
    breaker.record(&Err::<(), _>(ClientError::Cancelled {
        reason: clientry::CancelReason::Deadline,
    }));
    assert_eq!(breaker.failure_count(), 0);
    assert_eq!(breaker.metrics().total_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_burst_then_wait() {
    let limiter = RateLimiter::new(RateLimitConfig::new(10, 1.0));

    for _ in 0..10 {
        assert_eq!(limiter.acquire().await, Duration::ZERO);
    }

    let started = Instant::now();
    let waited = limiter.acquire().await;
    assert_eq!(waited, Duration::from_secs(1));
    assert_eq!(started.elapsed(), Duration::from_secs(1));

    let tokens = limiter.available_tokens().await;
    assert!((0.0..1.0).contains(&tokens));

    let metrics = limiter.metrics();
    assert_eq!(metrics.total_acquired, 11);
    assert_eq!(metrics.total_waits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_never_exceeds_capacity() {
    let limiter = RateLimiter::new(RateLimitConfig::new(3, 5.0));
    limiter.acquire().await;

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(limiter.available_tokens().await, 3.0);
}
