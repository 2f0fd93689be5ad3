//! Recommendation Metrics
//!
//! Prometheus metrics for the recommendation engine and its cache layer

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

static RECOMMENDATIONS_SERVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendations_served_total",
        "Recommended products returned, by provenance",
        &["reason"]
    )
    .expect("Failed to register recommendations served metric")
});

static FALLBACK_TIER_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_fallback_tier_total",
        "Popularity fallback tier that produced the result",
        &["tier"]
    )
    .expect("Failed to register fallback tier metric")
});

static CACHE_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_cache_lookups_total",
        "Recommendation cache lookups (hit/miss/stale/error)",
        &["outcome"]
    )
    .expect("Failed to register cache lookups metric")
});

static STAGE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "recommendation_stage_failures_total",
        "Recommender stages that degraded to a fallback after an error",
        &["stage"]
    )
    .expect("Failed to register stage failures metric")
});

static GENERATION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "recommendation_generation_duration_seconds",
        "Time spent generating recommendations",
        &["strategy"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register generation duration metric")
});

pub fn record_served(reason: &str, count: usize) {
    RECOMMENDATIONS_SERVED_TOTAL
        .with_label_values(&[reason])
        .inc_by(count as u64);
}

pub fn record_fallback_tier(tier: &str) {
    FALLBACK_TIER_TOTAL.with_label_values(&[tier]).inc();
}

pub fn record_cache_lookup(outcome: &str) {
    CACHE_LOOKUPS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_stage_failure(stage: &str) {
    STAGE_FAILURES_TOTAL.with_label_values(&[stage]).inc();
}

pub fn record_generation_duration(strategy: &str, duration: Duration) {
    GENERATION_DURATION_SECONDS
        .with_label_values(&[strategy])
        .observe(duration.as_secs_f64());
}

/// Render the default registry in the Prometheus text format.
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
