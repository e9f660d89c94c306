use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
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

    // Exchange log
    pub static ref EXCHANGE_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exchange_entries_total",
        "Total number of entries appended to the exchange log",
        &["kind"]
    )
    .unwrap();

    // Quiz Metrics
    pub static ref QUIZZES_STARTED_TOTAL: IntCounter = register_int_counter!(
        "quizzes_started_total",
        "Total number of quizzes fetched and started"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref SUBMISSIONS_SETTLED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_settled_total",
        "Total number of judge submissions settled",
        &["outcome"]
    )
    .unwrap();

    pub static ref SUBMISSIONS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "submissions_in_flight",
        "Number of judge submissions awaiting settlement"
    )
    .unwrap();

    pub static ref REPLAYS_TOTAL: IntCounter = register_int_counter!(
        "replays_total",
        "Total number of questions replayed after a rejected submission"
    )
    .unwrap();

    pub static ref GAMES_COMPLETED_TOTAL: IntCounter = register_int_counter!(
        "games_completed_total",
        "Total number of quizzes played to game over"
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
