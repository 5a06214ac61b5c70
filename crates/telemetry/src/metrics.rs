//! In-process metrics for the gateway.
//!
//! Counters and histograms are plain atomics; a point-in-time snapshot can be
//! exported by whatever sink the deployment wires up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can move in both directions.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn set(&self, val: i64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    buckets: [AtomicU64; 9],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Bucket upper bounds: 1ms .. 10s.
    const BOUNDS: [u64; 9] = [1, 5, 10, 50, 100, 500, 1000, 5000, 10000];

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        let idx = Self::BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

/// Gateway metrics registry.
#[derive(Debug, Default)]
pub struct Metrics {
    // Produce path
    pub batches_appended: Counter,
    pub duplicate_batches_returned: Counter,
    pub appends_rejected: Counter,

    // Transaction path
    pub transactions_started: Counter,
    pub transactions_committed: Counter,
    pub transactions_aborted: Counter,
    pub transactions_timed_out: Counter,
    pub markers_written: Counter,
    pub marker_write_retries: Counter,
    pub producers_fenced: Counter,

    // Producer state
    pub snapshots_taken: Counter,
    pub snapshots_loaded: Counter,
    pub snapshots_discarded: Counter,
    pub partitions_recovered: Counter,
    pub aborted_txns_purged: Counter,

    // Latency
    pub append_latency_ms: Histogram,
    pub end_txn_latency_ms: Histogram,
    pub recovery_latency_ms: Histogram,

    // Gauges
    pub open_transactions: Gauge,
    pub ready_partitions: Gauge,
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub batches_appended: u64,
    pub duplicate_batches_returned: u64,
    pub appends_rejected: u64,
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    pub transactions_timed_out: u64,
    pub markers_written: u64,
    pub producers_fenced: u64,
    pub snapshots_taken: u64,
    pub snapshots_discarded: u64,
    pub aborted_txns_purged: u64,
    pub append_latency_mean_ms: f64,
    pub end_txn_latency_mean_ms: f64,
    pub open_transactions: i64,
    pub ready_partitions: i64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            batches_appended: self.batches_appended.get(),
            duplicate_batches_returned: self.duplicate_batches_returned.get(),
            appends_rejected: self.appends_rejected.get(),
            transactions_committed: self.transactions_committed.get(),
            transactions_aborted: self.transactions_aborted.get(),
            transactions_timed_out: self.transactions_timed_out.get(),
            markers_written: self.markers_written.get(),
            producers_fenced: self.producers_fenced.get(),
            snapshots_taken: self.snapshots_taken.get(),
            snapshots_discarded: self.snapshots_discarded.get(),
            aborted_txns_purged: self.aborted_txns_purged.get(),
            append_latency_mean_ms: self.append_latency_ms.mean(),
            end_txn_latency_mean_ms: self.end_txn_latency_ms.mean(),
            open_transactions: self.open_transactions.get(),
            ready_partitions: self.ready_partitions.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::default);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
