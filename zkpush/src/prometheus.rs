// prometheus exporter setup

use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::gateway::StorageKind;

pub fn report_received_records(format: &'static str, quantity: u64) {
    counter!("zkpush_records_received_total", "format" => format).increment(quantity);
}

pub fn report_skipped_lines(quantity: u64) {
    counter!("zkpush_text_lines_skipped_total").increment(quantity);
}

pub fn report_stored_record(storage: StorageKind) {
    counter!("zkpush_records_stored_total", "storage" => storage.as_str()).increment(1);
}

pub fn report_dropped_record() {
    counter!("zkpush_records_dropped_total").increment(1);
}

pub fn report_primary_failure() {
    counter!("zkpush_primary_store_failures_total").increment(1);
}

pub fn report_fallback_size(size: usize) {
    gauge!("zkpush_fallback_records").set(size as f64);
}

pub fn report_connect_attempt(result: &'static str) {
    counter!("zkpush_store_connect_attempts_total", "result" => result).increment(1);
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Counts requests and records their latency, labelled by route template,
/// method and response status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let started = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |matched| matched.as_str().to_owned());

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_requests_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());

    response
}
