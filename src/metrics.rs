use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Cache Metrics (Redis)
    pub static ref CACHE_HIT_RATIO: CounterVec = register_counter_vec!(
        "cache_hit_ratio",
        "Cache hit/miss ratio",
        &["result"]
    )
    .unwrap();

    // Business Metrics
    pub static ref ANSWERS_GRADED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_graded_total",
        "Total number of answers graded",
        &["correct"]
    )
    .unwrap();

    pub static ref QUIZZES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quizzes_total",
        "Total number of quiz runs by terminal status",
        &["status"]
    )
    .unwrap();

    pub static ref TRIALS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "trials_started_total",
        "Total number of trial subscriptions created"
    )
    .unwrap();

    pub static ref TRIALS_ACTIVATED_TOTAL: IntCounter = register_int_counter!(
        "trials_activated_total",
        "Total number of trials converted to active subscriptions"
    )
    .unwrap();

    pub static ref SUBSCRIPTIONS_CANCELLED_TOTAL: IntCounter = register_int_counter!(
        "subscriptions_cancelled_total",
        "Total number of subscriptions cancelled"
    )
    .unwrap();

    pub static ref TRIAL_SWEEP_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "trial_sweep_ticks_total",
        "Total number of trial sweep worker ticks",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Record cache hit
pub fn record_cache_hit() {
    CACHE_HIT_RATIO.with_label_values(&["hit"]).inc();
}

/// Record cache miss
pub fn record_cache_miss() {
    CACHE_HIT_RATIO.with_label_values(&["miss"]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = ANSWERS_GRADED_TOTAL.with_label_values(&["true"]).get();
        let _ = TRIAL_SWEEP_TICKS_TOTAL.with_label_values(&["success"]).get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let result = render_metrics();
        assert!(result.is_ok());
        let output = result.unwrap();
        assert!(output.contains("http_requests_total"));
    }
}
