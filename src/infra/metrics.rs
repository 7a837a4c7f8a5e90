//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only; never use them for coordination or logic decisions.

use crate::domain::Intent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds) for per-fix processing time
///
/// A fix without a transition costs about a microsecond; one with a
/// transition includes the durable status write, often milliseconds.
/// Buckets: ≤1, ≤4, ≤16, ≤64, ≤256, ≤1024, ≤4096, ≤16384, ≤65536, ≤262144, >262144
const BUCKET_BOUNDS: [u64; 10] = [1, 4, 16, 64, 256, 1024, 4096, 16384, 65536, 262144];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 4x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [1, 4, 16, 64, 256, 1024, 4096, 16384, 65536, 262144, 1048576];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total fixes evaluated (monotonic)
    fixes_total: AtomicU64,
    /// Fixes since last report (reset on report)
    fixes_since_report: AtomicU64,
    /// Sum of evaluation latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max evaluation latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Evaluation latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Fixes discarded because the fence was cleared or replaced mid-flight
    stale_fixes_total: AtomicU64,
    /// Transition events produced by the evaluator (monotonic)
    transitions_total: AtomicU64,
    /// Events handed to the alert bus (monotonic)
    events_published: AtomicU64,
    /// Events overwritten in a full subscriber queue (monotonic)
    events_overwritten: AtomicU64,
    /// Durable status writes that failed (monotonic)
    persist_failures: AtomicU64,
    /// Activations ended because the location stream closed (monotonic)
    source_lost_total: AtomicU64,
    /// Commands routed, by intent
    go_home_total: AtomicU64,
    call_for_help_total: AtomicU64,
    unrecognized_total: AtomicU64,
    /// ActionSink calls that failed (monotonic)
    action_failures: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_total: AtomicU64::new(0),
            fixes_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            stale_fixes_total: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_overwritten: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            source_lost_total: AtomicU64::new(0),
            go_home_total: AtomicU64::new(0),
            call_for_help_total: AtomicU64::new(0),
            unrecognized_total: AtomicU64::new(0),
            action_failures: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a fix was processed (evaluate, persist, publish) with given latency
    #[inline]
    pub fn record_fix_evaluated(&self, latency_us: u64) {
        self.fixes_total.fetch_add(1, Ordering::Relaxed);
        self.fixes_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_stale_fix(&self) {
        self.stale_fixes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transition(&self) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_overwritten(&self) {
        self.events_overwritten.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_source_lost(&self) {
        self.source_lost_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command(&self, intent: Intent) {
        let counter = match intent {
            Intent::GoHome => &self.go_home_total,
            Intent::CallForHelp => &self.call_for_help_total,
            Intent::Unrecognized => &self.unrecognized_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_action_failure(&self) {
        self.action_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fixes_total(&self) -> u64 {
        self.fixes_total.load(Ordering::Relaxed)
    }

    pub fn transitions_total(&self) -> u64 {
        self.transitions_total.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn events_overwritten(&self) -> u64 {
        self.events_overwritten.load(Ordering::Relaxed)
    }

    pub fn stale_fixes_total(&self) -> u64 {
        self.stale_fixes_total.load(Ordering::Relaxed)
    }

    pub fn action_failures(&self) -> u64 {
        self.action_failures.load(Ordering::Relaxed)
    }

    pub fn source_lost_total(&self) -> u64 {
        self.source_lost_total.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting the periodic counters
    pub fn report(&self) -> MetricsSummary {
        let fixes_count = self.fixes_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let fixes_per_sec = if elapsed.as_secs_f64() > 0.0 {
            fixes_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if fixes_count > 0 { latency_sum / fixes_count } else { 0 };

        MetricsSummary {
            fixes_total: self.fixes_total.load(Ordering::Relaxed),
            fixes_per_sec,
            avg_eval_latency_us: avg_latency,
            max_eval_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            stale_fixes_total: self.stale_fixes_total.load(Ordering::Relaxed),
            transitions_total: self.transitions_total.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_overwritten: self.events_overwritten.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            source_lost_total: self.source_lost_total.load(Ordering::Relaxed),
            go_home_total: self.go_home_total.load(Ordering::Relaxed),
            call_for_help_total: self.call_for_help_total.load(Ordering::Relaxed),
            unrecognized_total: self.unrecognized_total.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub fixes_total: u64,
    pub fixes_per_sec: f64,
    pub avg_eval_latency_us: u64,
    pub max_eval_latency_us: u64,
    /// Fix processing latency histogram buckets
    /// Bounds: ≤1, ≤4, ≤16, ≤64, ≤256, ≤1024, ≤4096, ≤16384, ≤65536, ≤262144, >262144 µs
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub stale_fixes_total: u64,
    pub transitions_total: u64,
    pub events_published: u64,
    pub events_overwritten: u64,
    pub persist_failures: u64,
    pub source_lost_total: u64,
    pub go_home_total: u64,
    pub call_for_help_total: u64,
    pub unrecognized_total: u64,
    pub action_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            fixes_total = %self.fixes_total,
            fixes_per_sec = format!("{:.2}", self.fixes_per_sec),
            avg_latency_us = %self.avg_eval_latency_us,
            max_latency_us = %self.max_eval_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            transitions = %self.transitions_total,
            published = %self.events_published,
            overwritten = %self.events_overwritten,
            stale_fixes = %self.stale_fixes_total,
            persist_failures = %self.persist_failures,
            source_lost = %self.source_lost_total,
            commands = %(self.go_home_total + self.call_for_help_total + self.unrecognized_total),
            action_failures = %self.action_failures,
            "metrics"
        );
    }
}
