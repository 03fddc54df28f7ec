//! Circuit breaker implementation.
//!
//! The breaker sees one outcome per call, not per attempt. Transitions from
//! `Open` to `HalfOpen` happen lazily on the next admission check.

use crate::errors::ClientResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, allowing a probe request
    HalfOpen,
}

/// When the consecutive-failure counter goes back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureCountPolicy {
    /// Only a successful probe from `HalfOpen` resets the counter
    #[default]
    ResetOnRecovery,
    /// Any success while `Closed` also resets the counter
    ResetOnSuccess,
}

/// Configuration for the circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is admitted
    pub recovery_timeout: Duration,
    /// Admit only one probe at a time while half-open
    pub single_probe: bool,
    /// When the failure counter resets
    pub failure_count_policy: FailureCountPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            single_probe: true,
            failure_count_policy: FailureCountPolicy::ResetOnRecovery,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Allow or forbid concurrent half-open probes
    pub fn with_single_probe(mut self, single_probe: bool) -> Self {
        self.single_probe = single_probe;
        self
    }

    /// Set the failure counter policy
    pub fn with_failure_count_policy(mut self, policy: FailureCountPolicy) -> Self {
        self.failure_count_policy = policy;
        self
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The circuit is closed
    Allowed,
    /// The circuit is half-open and this call is the probe
    Probe,
    /// The circuit is open
    Rejected {
        /// Time until a probe will be admitted, if known
        retry_in: Option<Duration>,
    },
}

impl Admission {
    /// Returns true unless rejected.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// Hook for circuit breaker state changes
///
/// Hooks run after the breaker's lock is released, so they may query the
/// breaker they observe.
pub trait CircuitBreakerHook: Send + Sync {
    /// Called when circuit state changes
    fn on_state_change(&self, old_state: CircuitState, new_state: CircuitState);

    /// Called when a call is rejected
    fn on_rejected(&self) {}
}

impl<H: CircuitBreakerHook + ?Sized> CircuitBreakerHook for std::sync::Arc<H> {
    fn on_state_change(&self, old_state: CircuitState, new_state: CircuitState) {
        (**self).on_state_change(old_state, new_state);
    }

    fn on_rejected(&self) {
        (**self).on_rejected();
    }
}

struct NoopHook;

impl CircuitBreakerHook for NoopHook {
    fn on_state_change(&self, _old_state: CircuitState, _new_state: CircuitState) {}
}

type Transition = (CircuitState, CircuitState);

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker implementation
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    hook: Box<dyn CircuitBreakerHook>,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
    total_rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
            hook: Box::new(NoopHook),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
        }
    }

    /// Set a custom hook
    pub fn with_hook(mut self, hook: impl CircuitBreakerHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, applying any pending lazy transition.
    pub fn state(&self) -> CircuitState {
        let (current, change) = {
            let mut state = self.state.lock();
            let change = self.maybe_half_open(&mut state);
            (state.state, change)
        };
        self.notify(change);
        current
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Decide whether a call may proceed.
    pub fn admit(&self) -> Admission {
        let (admission, change) = {
            let mut state = self.state.lock();
            let change = self.maybe_half_open(&mut state);

            let admission = match state.state {
                CircuitState::Closed => Admission::Allowed,
                CircuitState::HalfOpen if !self.config.single_probe => Admission::Probe,
                CircuitState::HalfOpen if !state.probe_in_flight => {
                    state.probe_in_flight = true;
                    Admission::Probe
                }
                CircuitState::HalfOpen => Admission::Rejected { retry_in: None },
                CircuitState::Open => Admission::Rejected {
                    retry_in: state.last_failure_at.map(|at| {
                        self.config
                            .recovery_timeout
                            .saturating_sub(at.elapsed())
                    }),
                },
            };
            (admission, change)
        };

        self.notify(change);
        if !admission.is_admitted() {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            self.hook.on_rejected();
        }
        admission
    }

    /// Record the final outcome of a call.
    ///
    /// Errors that say nothing about the downstream (cancellation, caller
    /// mistakes) leave the state untouched.
    pub fn record<T>(&self, result: &ClientResult<T>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) if e.counts_as_failure() => self.record_failure(),
            Err(_) => {}
        }
    }

    /// Give back a probe slot without recording an outcome.
    pub fn release(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.state.lock().probe_in_flight = false;
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let change = {
            let mut state = self.state.lock();
            match state.state {
                CircuitState::Closed => {
                    if self.config.failure_count_policy == FailureCountPolicy::ResetOnSuccess {
                        state.failure_count = 0;
                    }
                    None
                }
                CircuitState::HalfOpen => {
                    state.failure_count = 0;
                    self.transition(&mut state, CircuitState::Closed)
                }
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let change = {
            let mut state = self.state.lock();
            state.last_failure_at = Some(Instant::now());

            match state.state {
                CircuitState::Closed => {
                    state.failure_count = state.failure_count.saturating_add(1);
                    if state.failure_count >= self.config.failure_threshold {
                        self.transition(&mut state, CircuitState::Open)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => self.transition(&mut state, CircuitState::Open),
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    /// Get metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        CircuitBreakerMetrics {
            state: state.state,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            current_failure_count: state.failure_count,
        }
    }

    fn maybe_half_open(&self, state: &mut BreakerState) -> Option<Transition> {
        if state.state != CircuitState::Open {
            return None;
        }
        let expired = state
            .last_failure_at
            .map_or(true, |at| at.elapsed() > self.config.recovery_timeout);
        if expired {
            self.transition(state, CircuitState::HalfOpen)
        } else {
            None
        }
    }

    /// Applies a state change under the lock; the hook runs later via `notify`.
    fn transition(&self, state: &mut BreakerState, new_state: CircuitState) -> Option<Transition> {
        let old_state = state.state;
        if old_state == new_state {
            return None;
        }

        state.state = new_state;
        state.probe_in_flight = false;

        match new_state {
            CircuitState::Open => warn!(
                failure_count = state.failure_count,
                recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!("Circuit breaker half-open, admitting probe"),
            CircuitState::Closed => info!("Circuit breaker closed"),
        }

        Some((old_state, new_state))
    }

    fn notify(&self, change: Option<Transition>) {
        if let Some((old_state, new_state)) = change {
            self.hook.on_state_change(old_state, new_state);
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Metrics for the circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: CircuitState,
    /// Total number of recorded calls
    pub total_calls: u64,
    /// Total number of recorded failures
    pub total_failures: u64,
    /// Total number of rejections
    pub total_rejections: u64,
    /// Current consecutive failure count
    pub current_failure_count: u32,
}
