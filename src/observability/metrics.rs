//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `stargazer_events_enqueued_total` - Watch events added to a work queue, by kind and operation
//! - `stargazer_syncs_total` - Queue items processed successfully, by kind
//! - `stargazer_sync_errors_total` - Queue items whose sync failed, by kind and reason
//! - `stargazer_sync_duration_seconds` - Duration of a single item sync, by kind
//! - `stargazer_requeues_total` - Items put back on the queue with backoff, by kind
//! - `stargazer_items_dropped_total` - Items given up on after an error, by kind
//! - `stargazer_queue_depth` - Items currently pending in a work queue, by kind
//! - `stargazer_store_operations_total` - Datastore operations, by operation and outcome
//! - `stargazer_controllers_running` - Controllers past cache sync and running workers

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static EVENTS_ENQUEUED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_events_enqueued_total",
            "Total number of watch events added to a work queue",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create EVENTS_ENQUEUED_TOTAL metric - this should never happen")
});

static SYNCS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_syncs_total",
            "Total number of queue items synced successfully",
        ),
        &["kind"],
    )
    .expect("Failed to create SYNCS_TOTAL metric - this should never happen")
});

static SYNC_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_sync_errors_total",
            "Total number of failed queue item syncs",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create SYNC_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "stargazer_sync_duration_seconds",
            "Duration of a queue item sync in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["kind"],
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_requeues_total",
            "Total number of items requeued with backoff",
        ),
        &["kind"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static ITEMS_DROPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_items_dropped_total",
            "Total number of items dropped after a non-retryable error or too many retries",
        ),
        &["kind"],
    )
    .expect("Failed to create ITEMS_DROPPED_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "stargazer_queue_depth",
            "Current number of items pending in a work queue",
        ),
        &["kind"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "stargazer_store_operations_total",
            "Total number of datastore operations by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static CONTROLLERS_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "stargazer_controllers_running",
        "Number of controllers past cache sync and running workers",
    )
    .expect("Failed to create CONTROLLERS_RUNNING metric - this should never happen")
});

/// Register all metrics with the process registry
///
/// # Errors
///
/// Fails if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(EVENTS_ENQUEUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ITEMS_DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONTROLLERS_RUNNING.clone()))?;

    Ok(())
}

pub fn increment_events_enqueued(kind: &str, operation: &str) {
    EVENTS_ENQUEUED_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_syncs(kind: &str) {
    SYNCS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_sync_errors(kind: &str, reason: &str) {
    SYNC_ERRORS_TOTAL.with_label_values(&[kind, reason]).inc();
}

pub fn observe_sync_duration(kind: &str, duration: f64) {
    SYNC_DURATION.with_label_values(&[kind]).observe(duration);
}

pub fn increment_requeues(kind: &str) {
    REQUEUES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_items_dropped(kind: &str) {
    ITEMS_DROPPED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn set_queue_depth(kind: &str, depth: usize) {
    QUEUE_DEPTH
        .with_label_values(&[kind])
        .set(i64::try_from(depth).unwrap_or(i64::MAX));
}

pub fn increment_store_operations(operation: &str, outcome: &str) {
    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn increment_controllers_running() {
    CONTROLLERS_RUNNING.inc();
}

pub fn decrement_controllers_running() {
    CONTROLLERS_RUNNING.dec();
}
