//! Metrics definitions for the sweep pipeline.
//!
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!("sweep_runs_total", "Total number of sweep runs started");
    describe_counter!(
        "sweep_batches_total",
        "Total number of planned batches by terminal status"
    );
    describe_counter!(
        "sweep_batch_failures_total",
        "Total number of failed batches by failure kind"
    );
    describe_counter!(
        "sweep_tokens_transferred_total",
        "Total number of token transfers in confirmed batches"
    );
    describe_counter!(
        "sweep_native_units_total",
        "Total native units moved by confirmed batches"
    );
    describe_counter!(
        "sweep_scan_fallbacks_total",
        "Total number of scans that fell back from the balance index to the ledger"
    );
    describe_histogram!(
        "sweep_batch_duration_seconds",
        "Time from build to terminal state of a batch in seconds"
    );
}

/// Record the start of a run.
pub fn record_run_started() {
    counter!("sweep_runs_total").increment(1);
}

/// Record a batch reaching a terminal status.
///
/// # Arguments
/// * `status` - "confirmed", "failed" or "skipped"
pub fn record_batch(status: &'static str) {
    counter!("sweep_batches_total", "status" => status).increment(1);
}

/// Record a batch failure.
///
/// # Arguments
/// * `kind` - Stable failure label from [`crate::error::BatchError::kind`]
pub fn record_batch_failure(kind: &'static str) {
    counter!("sweep_batch_failures_total", "kind" => kind).increment(1);
}

/// Record what a confirmed batch moved.
pub fn record_transferred(token_transfers: usize, native_units: u64) {
    counter!("sweep_tokens_transferred_total").increment(token_transfers as u64);
    counter!("sweep_native_units_total").increment(native_units);
}

/// Record a scan that fell back to the ledger.
pub fn record_scan_fallback() {
    counter!("sweep_scan_fallbacks_total").increment(1);
}

/// Record batch duration.
pub fn record_batch_duration(duration_secs: f64) {
    histogram!("sweep_batch_duration_seconds").record(duration_secs);
}

/// A timer that automatically records batch duration when dropped.
pub struct BatchTimer {
    start: Instant,
}

impl BatchTimer {
    /// Start a new batch timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for BatchTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchTimer {
    fn drop(&mut self) {
        record_batch_duration(self.start.elapsed().as_secs_f64());
    }
}
