//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Batch jobs (outcomes, duration, per-file errors)
//! - Review (pulls, decisions)
//! - Local engine renders

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Batch Metrics
// =============================================================================

/// Finished batch jobs by outcome.
pub static BATCH_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixbatch_batch_jobs_total", "Total batch jobs finished"),
        &["outcome"], // "completed", "completed_with_errors", "cancelled", "failed"
    )
    .unwrap()
});

/// Time from submission to a terminal state, in seconds.
pub static BATCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "pixbatch_batch_duration_seconds",
            "Duration of batch jobs from submission to completion",
        )
        .buckets(vec![
            0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0,
        ]),
    )
    .unwrap()
});

/// Per-file errors reported by completed batches.
pub static BATCH_FILE_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pixbatch_batch_file_errors_total",
        "Total per-file errors reported by completed batches",
    )
    .unwrap()
});

// =============================================================================
// Review Metrics
// =============================================================================

/// Review queue pulls by result.
pub static REVIEW_PULLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixbatch_review_pulls_total", "Total review queue pulls"),
        &["result"], // "item", "not_ready", "exhausted", "error"
    )
    .unwrap()
});

/// Review decisions by kind.
pub static REVIEW_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixbatch_review_decisions_total", "Total review decisions"),
        &["decision"], // "approve", "reject", "cancel"
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics
// =============================================================================

/// Renders performed by the local engine, by result.
pub static RENDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixbatch_renders_total", "Total script renders"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Batch
        Box::new(BATCH_JOBS.clone()),
        Box::new(BATCH_DURATION.clone()),
        Box::new(BATCH_FILE_ERRORS.clone()),
        // Review
        Box::new(REVIEW_PULLS.clone()),
        Box::new(REVIEW_DECISIONS.clone()),
        // Engine
        Box::new(RENDERS_TOTAL.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        REVIEW_DECISIONS.with_label_values(&["approve"]).inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"pixbatch_review_decisions_total".to_string()));
    }
}
