//! # Metrics
//!
//! Prometheus metrics for controller operations: reconciliations, artifact
//! builds, source fetches, and garbage collection.

use std::sync::LazyLock;

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Opts, Registry};

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "artifact_generator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "artifact_generator_reconciliation_errors_total",
            "Total number of reconciliation errors by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "artifact_generator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ARTIFACTS_BUILT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "artifact_generator_artifacts_built_total",
        "Total number of output artifacts built and archived",
    )
    .expect("Failed to create ARTIFACTS_BUILT_TOTAL metric - this should never happen")
});

static SOURCE_FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "artifact_generator_source_fetches_total",
        "Total number of source artifact downloads",
    )
    .expect("Failed to create SOURCE_FETCHES_TOTAL metric - this should never happen")
});

static NO_DRIFT_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "artifact_generator_no_drift_total",
        "Total number of reconciliations that exited early without drift",
    )
    .expect("Failed to create NO_DRIFT_TOTAL metric - this should never happen")
});

/// Register all metrics with the Prometheus registry
///
/// Prometheus Registry::register() takes ownership (Box<dyn Collector>),
/// so we clone the metrics. Since Prometheus metrics internally use Arc,
/// cloning is cheap (just increments a reference count).
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ARTIFACTS_BUILT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NO_DRIFT_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations_total() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(seconds: f64) {
    RECONCILIATION_DURATION.observe(seconds);
}

pub fn increment_artifacts_built_total() {
    ARTIFACTS_BUILT_TOTAL.inc();
}

pub fn increment_source_fetches_total() {
    SOURCE_FETCHES_TOTAL.inc();
}

pub fn increment_no_drift_total() {
    NO_DRIFT_TOTAL.inc();
}

/// Render the registry in the Prometheus text exposition format
pub fn gather() -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
