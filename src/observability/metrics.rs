//! Metrics collection for the client.
//!
//! Metrics are keyed by endpoint label (`"GET /status/{code}"`), so the
//! template rather than the rendered path is the unit of aggregation.

use crate::errors::ErrorCategory;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A counter metric
#[derive(Debug)]
pub struct Counter {
    name: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Get the name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A histogram of durations
#[derive(Debug)]
pub struct Histogram {
    name: String,
    buckets: Vec<Duration>,
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_buckets(
            name,
            [5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        )
    }

    /// Create a histogram with custom bucket upper bounds
    pub fn with_buckets(name: impl Into<String>, buckets: Vec<Duration>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            name: name.into(),
            buckets,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Observe a value
    pub fn observe(&self, value: Duration) {
        for (i, bucket) in self.buckets.iter().enumerate() {
            if value <= *bucket {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the count
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Mean of the observed values
    pub fn mean(&self) -> Option<Duration> {
        let count = self.count();
        if count == 0 {
            return None;
        }
        Some(Duration::from_micros(
            self.sum_micros.load(Ordering::Relaxed) / count,
        ))
    }

    /// Get cumulative bucket counts
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

/// Trait for metrics collection
pub trait MetricsCollector: Send + Sync {
    /// A call was started
    fn record_call(&self, endpoint: &str);

    /// An attempt was sent
    fn record_attempt(&self, endpoint: &str);

    /// A retry was scheduled after `delay`
    fn record_retry(&self, endpoint: &str, delay: Duration);

    /// A call completed successfully
    fn record_success(&self, endpoint: &str, latency: Duration);

    /// A call failed
    fn record_failure(&self, endpoint: &str, category: ErrorCategory);

    /// A call was rejected by the circuit breaker
    fn record_circuit_rejection(&self, endpoint: &str);

    /// A call waited for a rate limit token
    fn record_rate_limit_wait(&self, endpoint: &str, wait: Duration);

    /// Get a snapshot of all metrics
    fn snapshot(&self) -> MetricsSnapshot;
}

/// A snapshot of metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Calls by endpoint
    pub calls: HashMap<String, u64>,
    /// Attempts by endpoint
    pub attempts: HashMap<String, u64>,
    /// Retries by endpoint
    pub retries: HashMap<String, u64>,
    /// Successful calls by endpoint
    pub successes: HashMap<String, u64>,
    /// Failed calls by `endpoint.category`
    pub failures: HashMap<String, u64>,
    /// Circuit breaker rejections by endpoint
    pub circuit_rejections: HashMap<String, u64>,
    /// Rate limit waits by endpoint
    pub rate_limit_waits: HashMap<String, u64>,
    /// Mean success latency by endpoint
    pub mean_latency: HashMap<String, Duration>,
}

impl MetricsSnapshot {
    /// Sum of a counter map.
    pub fn total(map: &HashMap<String, u64>) -> u64 {
        map.values().sum()
    }
}

type CounterMap = RwLock<HashMap<String, Arc<Counter>>>;

/// In-memory metrics collector
#[derive(Default)]
pub struct InMemoryMetricsCollector {
    calls: CounterMap,
    attempts: CounterMap,
    retries: CounterMap,
    successes: CounterMap,
    failures: CounterMap,
    circuit_rejections: CounterMap,
    rate_limit_waits: CounterMap,
    latencies: RwLock<HashMap<String, Arc<Histogram>>>,
}

impl InMemoryMetricsCollector {
    /// Create a new in-memory metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(map: &CounterMap, key: &str) -> Arc<Counter> {
        {
            let read = map.read();
            if let Some(counter) = read.get(key) {
                return counter.clone();
            }
        }

        let mut write = map.write();
        write
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Counter::new(key)))
            .clone()
    }

    fn histogram(&self, key: &str) -> Arc<Histogram> {
        {
            let read = self.latencies.read();
            if let Some(histogram) = read.get(key) {
                return histogram.clone();
            }
        }

        let mut write = self.latencies.write();
        write
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Histogram::new(key)))
            .clone()
    }

    fn collect(map: &CounterMap) -> HashMap<String, u64> {
        map.read()
            .iter()
            .map(|(key, counter)| (key.clone(), counter.get()))
            .collect()
    }
}

impl MetricsCollector for InMemoryMetricsCollector {
    fn record_call(&self, endpoint: &str) {
        Self::counter(&self.calls, endpoint).inc();
    }

    fn record_attempt(&self, endpoint: &str) {
        Self::counter(&self.attempts, endpoint).inc();
    }

    fn record_retry(&self, endpoint: &str, _delay: Duration) {
        Self::counter(&self.retries, endpoint).inc();
    }

    fn record_success(&self, endpoint: &str, latency: Duration) {
        Self::counter(&self.successes, endpoint).inc();
        self.histogram(endpoint).observe(latency);
    }

    fn record_failure(&self, endpoint: &str, category: ErrorCategory) {
        let key = format!("{}.{}", endpoint, category.as_str());
        Self::counter(&self.failures, &key).inc();
    }

    fn record_circuit_rejection(&self, endpoint: &str) {
        Self::counter(&self.circuit_rejections, endpoint).inc();
    }

    fn record_rate_limit_wait(&self, endpoint: &str, _wait: Duration) {
        Self::counter(&self.rate_limit_waits, endpoint).inc();
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: Self::collect(&self.calls),
            attempts: Self::collect(&self.attempts),
            retries: Self::collect(&self.retries),
            successes: Self::collect(&self.successes),
            failures: Self::collect(&self.failures),
            circuit_rejections: Self::collect(&self.circuit_rejections),
            rate_limit_waits: Self::collect(&self.rate_limit_waits),
            mean_latency: self
                .latencies
                .read()
                .iter()
                .filter_map(|(key, histogram)| histogram.mean().map(|mean| (key.clone(), mean)))
                .collect(),
        }
    }
}

impl std::fmt::Debug for InMemoryMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMetricsCollector")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// No-op metrics collector for when metrics are disabled
#[derive(Debug, Default)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_call(&self, _endpoint: &str) {}
    fn record_attempt(&self, _endpoint: &str) {}
    fn record_retry(&self, _endpoint: &str, _delay: Duration) {}
    fn record_success(&self, _endpoint: &str, _latency: Duration) {}
    fn record_failure(&self, _endpoint: &str, _category: ErrorCategory) {}
    fn record_circuit_rejection(&self, _endpoint: &str) {}
    fn record_rate_limit_wait(&self, _endpoint: &str, _wait: Duration) {}
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}
