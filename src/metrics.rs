use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing one summarization run.
#[derive(Default)]
pub struct QueryMetrics {
    remote_calls: AtomicU64,
    retries: AtomicU64,
    rate_limit_waits: AtomicU64,
    subdivisions: AtomicU64,
    chunks: AtomicU64,
}

impl QueryMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one submission to the remote summarizer.
    pub fn record_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a wait before resubmitting the same text.
    pub fn record_retry(&self, rate_limited: bool) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        if rate_limited {
            self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a rejected text being split into smaller chunks.
    pub fn record_subdivision(&self) {
        self.subdivisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the number of top-level chunks produced for the document.
    pub fn record_chunks(&self, count: u64) {
        self.chunks.fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            subdivisions: self.subdivisions.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of run counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Submissions made to the remote summarizer, retries included.
    pub remote_calls: u64,
    /// Waits before resubmitting the same text.
    pub retries: u64,
    /// Subset of `retries` caused by rate limiting.
    pub rate_limit_waits: u64,
    /// Rejected texts that were split and resummarized.
    pub subdivisions: u64,
    /// Top-level chunks produced from the document.
    pub chunks: u64,
}
