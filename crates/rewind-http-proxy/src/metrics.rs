//! Prometheus metrics for rewind-http-proxy.
//!
//! Tracks intercepted request outcomes, upstream latency and archive writes.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Intercepted requests by target and outcome
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "rewind_requests_total",
        "Total number of intercepted requests handled by the proxy",
        &["target", "outcome"]  // outcome: replayed|recorded|proxied|missing|preflight|error
    )
    .unwrap();

    /// Recordings written to the store
    pub static ref RECORDINGS_WRITTEN_TOTAL: CounterVec = register_counter_vec!(
        "rewind_recordings_written_total",
        "Total number of recordings written",
        &["target"]
    )
    .unwrap();

    /// Upstream call duration
    pub static ref UPSTREAM_DURATION_MS: HistogramVec = register_histogram_vec!(
        "rewind_upstream_duration_ms",
        "Duration of upstream calls in milliseconds",
        &["target", "status"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(target: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[target, outcome]).inc();
}

pub fn record_recording_written(target: &str) {
    RECORDINGS_WRITTEN_TOTAL.with_label_values(&[target]).inc();
}

pub fn record_upstream_duration(target: &str, status: u16, duration_ms: f64) {
    UPSTREAM_DURATION_MS
        .with_label_values(&[target, &status.to_string()])
        .observe(duration_ms);
}
