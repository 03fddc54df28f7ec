//! Cancellation, deadline and admission handling for a single call.

use crate::errors::{CancelReason, ClientError, ClientResult};
use crate::request::CallOptions;
use crate::resilience::{Admission, CircuitBreaker};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Watches the caller's token and deadline at every suspension point.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallGuard {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl CallGuard {
    pub(crate) fn new(options: &CallOptions) -> Self {
        Self {
            deadline: options.deadline,
            token: options.cancellation.clone(),
        }
    }

    /// Fails if the call is already cancelled or past its deadline.
    pub(crate) fn check(&self) -> ClientResult<()> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(cancelled(CancelReason::Token));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(cancelled(CancelReason::Deadline));
        }
        Ok(())
    }

    /// Drives `fut` to completion unless the call is cancelled first.
    ///
    /// The future is dropped on cancellation, which aborts an in-flight
    /// request or an unfinished rate limiter wait.
    pub(crate) async fn run<F>(&self, fut: F) -> ClientResult<F::Output>
    where
        F: Future,
    {
        self.check()?;

        let token = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = token => Err(cancelled(CancelReason::Token)),
            _ = deadline => Err(cancelled(CancelReason::Deadline)),
            output = fut => Ok(output),
        }
    }

    /// Sleeps for `delay` unless the call is cancelled first.
    pub(crate) async fn sleep(&self, delay: Duration) -> ClientResult<()> {
        self.run(tokio::time::sleep(delay)).await
    }
}

fn cancelled(reason: CancelReason) -> ClientError {
    ClientError::Cancelled { reason }
}

/// An admitted call's hold on the circuit breaker.
///
/// Unless [`settle`](Self::settle) records an outcome, dropping the permit
/// gives a half-open probe slot back. This covers callers that drop the
/// `execute` future mid-flight.
pub(crate) struct AdmissionPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    recorded: bool,
}

impl<'a> AdmissionPermit<'a> {
    pub(crate) fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission,
            recorded: false,
        }
    }

    /// Records the call's final outcome with the breaker.
    pub(crate) fn settle<T>(mut self, result: &ClientResult<T>) {
        self.breaker.record(result);
        self.recorded = match result {
            Ok(_) => true,
            Err(e) => e.counts_as_failure(),
        };
    }
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.release(self.admission);
        }
    }
}
