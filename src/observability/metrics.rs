//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): requests by route, status
//! - `bridge_request_duration_seconds` (histogram): latency by route
//! - `bridge_rejections_total` (counter): rejections by error code
//! - `bridge_rate_limited_total` (counter): throttled requests by limiter class
//! - `bridge_webhook_events_total` (counter): webhook outcomes (accepted, duplicate, rejected)
//! - `bridge_backend_errors_total` (counter): shared-state failures by backend, policy
//! - `bridge_rate_limit_buckets` (gauge): live rate-limit buckets
//! - `bridge_replay_records` (gauge): live replay identifiers
//!
//! # Design Decisions
//! - Recording functions are no-ops until `init_metrics` installs an exporter
//! - Labels are low-cardinality: never identities or event ids

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter started");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

fn describe() {
    describe_counter!("bridge_requests_total", "Total requests handled by route and status");
    describe_histogram!("bridge_request_duration_seconds", "Request latency in seconds");
    describe_counter!("bridge_rejections_total", "Rejected requests by error code");
    describe_counter!("bridge_rate_limited_total", "Throttled requests by limiter class");
    describe_counter!("bridge_webhook_events_total", "Webhook deliveries by outcome");
    describe_counter!("bridge_backend_errors_total", "Shared-state backend failures");
    describe_gauge!("bridge_rate_limit_buckets", "Live rate-limit buckets");
    describe_gauge!("bridge_replay_records", "Live replay identifiers");
}

/// Record one finished request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "bridge_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(code: &'static str) {
    counter!("bridge_rejections_total", "code" => code).increment(1);
}

pub fn record_rate_limited(class: &'static str) {
    counter!("bridge_rate_limited_total", "class" => class).increment(1);
}

/// `outcome` is one of `accepted`, `duplicate`, `rejected`.
pub fn record_webhook_event(outcome: &'static str) {
    counter!("bridge_webhook_events_total", "outcome" => outcome).increment(1);
}

pub fn record_backend_error(backend: &'static str, policy: &'static str) {
    counter!("bridge_backend_errors_total", "backend" => backend, "policy" => policy).increment(1);
}

pub fn record_state_sizes(buckets: usize, replay_records: usize) {
    gauge!("bridge_rate_limit_buckets").set(buckets as f64);
    gauge!("bridge_replay_records").set(replay_records as f64);
}
