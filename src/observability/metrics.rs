//! Metrics collection and exposition.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Histogram buckets for brokered-request latency, in seconds. The tail
/// follows the engine's deadlines: queued requests resolve by 30 s, forwarded
/// ones by 150 s.
const DURATION_BUCKETS: [f64; 10] = [
    0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 150.0,
];

/// Install the Prometheus exporter and prime the broker's gauges.
///
/// Failure is reported to the caller, not fatal: a broker without an
/// exporter still brokers.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("broker_request_duration_seconds".to_string()),
            &DURATION_BUCKETS,
        )?
        .install()?;

    // Zero the gauges so the first scrape shows the broker's shape, not an
    // absence of series.
    record_pending(0);
    gauge!("broker_control_sessions").set(0.0);

    tracing::info!("Metrics server listening on http://{}", addr);
    Ok(())
}

/// Record a completed brokered request.
pub fn record_brokered(status: u16, duration: Duration) {
    let labels = [("status", status.to_string())];

    counter!("broker_requests_total", &labels).increment(1);
    histogram!("broker_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Update the active control-channel session gauge.
pub fn record_session(delta: i64) {
    gauge!("broker_control_sessions").increment(delta as f64);
}

/// Record a rate-limit rejection.
pub fn record_rate_limited(kind: &'static str) {
    counter!("broker_rate_limited_total", "kind" => kind).increment(1);
}

/// Update the pending-table size gauge.
pub fn record_pending(size: usize) {
    gauge!("broker_pending_requests").set(size as f64);
}
