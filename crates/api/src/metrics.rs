use index::IngestReport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Pipeline counts
    documents_ingested: AtomicUsize,
    chunks_processed: AtomicUsize,
    chunks_failed: AtomicUsize,
    nodes_written: AtomicUsize,
    relationships_written: AtomicUsize,
    discovery_runs: AtomicUsize,
    patterns_discovered: AtomicUsize,
    verification_batches: AtomicUsize,
    hypotheses_verified: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_discover_time_us: AtomicU64,
    total_verify_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ingest(&self, duration: Duration, report: &IngestReport) {
        self.total_ingest_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed.fetch_add(report.chunks_processed, Ordering::Relaxed);
        self.chunks_failed.fetch_add(report.failures.len(), Ordering::Relaxed);
        self.nodes_written.fetch_add(report.nodes_written, Ordering::Relaxed);
        self.relationships_written.fetch_add(report.relationships_written, Ordering::Relaxed);
    }

    pub fn record_discovery(&self, duration: Duration, patterns: usize) {
        self.total_discover_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.discovery_runs.fetch_add(1, Ordering::Relaxed);
        self.patterns_discovered.fetch_add(patterns, Ordering::Relaxed);
    }

    pub fn record_verification(&self, duration: Duration, verified: usize) {
        self.total_verify_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.verification_batches.fetch_add(1, Ordering::Relaxed);
        self.hypotheses_verified.fetch_add(verified, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            nodes_written: self.nodes_written.load(Ordering::Relaxed),
            relationships_written: self.relationships_written.load(Ordering::Relaxed),
            patterns_discovered: self.patterns_discovered.load(Ordering::Relaxed),
            hypotheses_verified: self.hypotheses_verified.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, &self.documents_ingested),
            avg_discover_time_ms: avg_time_ms(&self.total_discover_time_us, &self.discovery_runs),
            avg_verify_time_ms: avg_time_ms(&self.total_verify_time_us, &self.verification_batches),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub documents_ingested: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub nodes_written: usize,
    pub relationships_written: usize,
    pub patterns_discovered: usize,
    pub hypotheses_verified: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_discover_time_ms: f64,
    pub avg_verify_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
