use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec, IntCounter,
    IntCounterVec, TextEncoder,
};

pub static ANALYSIS_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "analysis_requests_total",
        "Total number of analysis requests by outcome",
        &["status"]
    )
    .expect("register analysis_requests_total")
});

pub static ANALYSIS_COMMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("analysis_comments_total", "Total number of comments analyzed")
        .expect("register analysis_comments_total")
});

pub static ANALYSIS_WARNINGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "analysis_warnings_total",
        "Warnings attached to analysis responses",
        &["kind"]
    )
    .expect("register analysis_warnings_total")
});

pub static SENTIMENT_BACKEND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "sentiment_backend_total",
        "Texts scored per sentiment backend",
        &["backend"]
    )
    .expect("register sentiment_backend_total")
});

pub static SENTIMENT_TIME_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentiment_time_seconds",
        "Histogram of batch sentiment scoring durations",
        &["backend"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0]
    )
    .expect("register sentiment_time_seconds")
});

pub static CLUSTERING_TIME_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "clustering_time_seconds",
        "Histogram of aspect clustering durations",
        &["algorithm"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 30.0]
    )
    .expect("register clustering_time_seconds")
});

pub static CLUSTERING_FALLBACKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "clustering_fallbacks_total",
        "Clustering runs that degraded to another algorithm or to the empty result",
        &["from", "reason"]
    )
    .expect("register clustering_fallbacks_total")
});

pub fn gather_metrics() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
