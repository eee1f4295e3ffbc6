//! Recompute Metrics
//!
//! Prometheus metrics for recomputations and inference calls

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static RECOMPUTE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_recompute_total",
        "Total recomputations by outcome (committed/in_progress/rejected/failed)",
        &["outcome"]
    )
    .expect("Failed to register recompute total metric")
});

static RECOMPUTE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recommendation_recompute_duration_seconds",
        "Duration of recomputations",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to register recompute duration metric")
});

static INFERENCE_CALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_inference_calls_total",
        "Inference calls by model and status",
        &["model", "status"]
    )
    .expect("Failed to register inference calls metric")
});

pub fn record_recompute(outcome: &str, duration: Duration) {
    RECOMPUTE_TOTAL.with_label_values(&[outcome]).inc();
    RECOMPUTE_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_inference_call(model: &str, status: &str) {
    INFERENCE_CALLS_TOTAL.with_label_values(&[model, status]).inc();
}

/// Render the default registry in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
