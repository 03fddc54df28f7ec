//! Rate limiter implementation using token bucket algorithm.

use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for rate limiting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Bucket capacity; also the number of calls admitted in a burst.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 1.0,
        }
    }
}

impl RateLimitConfig {
    /// Creates a configuration.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }
}

/// Token bucket for rate limiting.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            tokens: f64::from(capacity),
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }
}

/// Token-bucket rate limiter shared by every call of one client.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
    total_acquired: AtomicU64,
    total_waits: AtomicU64,
    total_wait_micros: AtomicU64,
    last_wait: SyncMutex<Option<Duration>>,
}

impl RateLimiter {
    /// Creates a new rate limiter. The bucket starts full.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(config.capacity, config.refill_rate)),
            config,
            total_acquired: AtomicU64::new(0),
            total_waits: AtomicU64::new(0),
            total_wait_micros: AtomicU64::new(0),
            last_wait: SyncMutex::new(None),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Takes one token, waiting for it if the bucket is empty.
    ///
    /// Refill, wait and deduction happen under one lock, so concurrent callers
    /// queue behind each other instead of over-drawing the bucket. Dropping
    /// the returned future while it waits takes nothing. Returns how long the
    /// caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;

        let wait = bucket.time_until_available();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for token");
            tokio::time::sleep(wait).await;
            bucket.refill();
            self.total_waits.fetch_add(1, Ordering::Relaxed);
            self.total_wait_micros
                .fetch_add(wait.as_micros() as u64, Ordering::Relaxed);
            *self.last_wait.lock() = Some(wait);
        }

        bucket.take();
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        wait
    }

    /// Takes one token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut bucket) = self.bucket.try_lock() else {
            return false;
        };
        bucket.refill();
        if bucket.tokens >= 1.0 {
            bucket.take();
            self.total_acquired.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, after refill.
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens
    }

    /// Get metrics
    pub fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_waits: self.total_waits.load(Ordering::Relaxed),
            total_wait_time: Duration::from_micros(self.total_wait_micros.load(Ordering::Relaxed)),
            last_wait: *self.last_wait.lock(),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Metrics for the rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterMetrics {
    /// Tokens handed out
    pub total_acquired: u64,
    /// Acquisitions that had to wait
    pub total_waits: u64,
    /// Total time spent waiting
    pub total_wait_time: Duration,
    /// Most recent wait, if any
    pub last_wait: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_does_not_wait() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 1.0));
        let start = Instant::now();
        for _ in 0..10 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available_tokens().await, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eleventh_call_waits_one_second() {
        let limiter = RateLimiter::new(RateLimitConfig::new(10, 1.0));
        for _ in 0..10 {
            limiter.acquire().await;
        }

        let start = Instant::now();
        let waited = limiter.acquire().await;
        assert_eq!(waited, Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));

        let metrics = limiter.metrics();
        assert_eq!(metrics.total_acquired, 11);
        assert_eq!(metrics.total_waits, 1);
        assert_eq!(metrics.last_wait, Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, 2.0));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available_tokens().await, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 1.0));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquirers_are_paced() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(2, 2.0)));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // Two from the burst, four more at 0.5s each
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
        let tokens = limiter.available_tokens().await;
        assert!((0.0..=2.0).contains(&tokens));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_takes_nothing() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 1.0));
        limiter.acquire().await;

        let timed_out =
            tokio::time::timeout(Duration::from_millis(500), limiter.acquire()).await;
        assert!(timed_out.is_err());

        let tokens = limiter.available_tokens().await;
        assert!((tokens - 0.5).abs() < 1e-9);
        assert_eq!(limiter.metrics().total_acquired, 1);
    }
}
