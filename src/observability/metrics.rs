//! Metrics collection and exposition.
//!
//! # Metrics
//! - `governor_requests_total` (counter): governed requests by resource, outcome
//! - `governor_request_duration_seconds` (histogram): end-to-end latency
//! - `governor_cache_events_total` (counter): hit / miss / set / eviction
//! - `governor_cache_size` (gauge): current number of cache entries
//! - `governor_retries_total` (counter): retries by error kind
//! - `governor_rate_limiter_waits_total` (counter): acquisitions that had to queue
//! - `governor_rate_limiter_queue_length` (gauge): waiters currently queued
//!
//! Recording is a no-op until a recorder is installed (see [`init_metrics`]).

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of one governed request.
pub fn record_request(resource: &'static str, outcome: &'static str, start: Instant) {
    ::metrics::counter!("governor_requests_total", "resource" => resource, "outcome" => outcome)
        .increment(1);
    ::metrics::histogram!("governor_request_duration_seconds", "resource" => resource)
        .record(start.elapsed().as_secs_f64());
}

/// Record a cache event (`hit`, `miss`, `set`, `eviction`).
pub fn record_cache_event(event: &'static str) {
    ::metrics::counter!("governor_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(size: usize) {
    ::metrics::gauge!("governor_cache_size").set(size as f64);
}

/// Record a retry triggered by an error of the given kind.
pub fn record_retry(kind: &'static str) {
    ::metrics::counter!("governor_retries_total", "kind" => kind).increment(1);
}

/// Record an acquisition that had to wait in the queue.
pub fn record_rate_limit_wait(queue_length: usize) {
    ::metrics::counter!("governor_rate_limiter_waits_total").increment(1);
    record_queue_length(queue_length);
}

pub fn record_queue_length(queue_length: usize) {
    ::metrics::gauge!("governor_rate_limiter_queue_length").set(queue_length as f64);
}
