use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

pub static TOUR_OPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tour_ops_total",
        "Tour controller operations by outcome",
        &["op", "outcome"]
    )
    .expect("tour_ops_total registers once")
});

pub static TOUR_OP_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!("tour_op_seconds", "Tour controller latency", &["op"])
        .expect("tour_op_seconds registers once")
});

/// Default registry in Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!(error = %e, "metrics encoding failed");
    }
    String::from_utf8(buf).unwrap_or_default()
}
