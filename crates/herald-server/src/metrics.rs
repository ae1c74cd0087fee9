//! Metrics collection and export for Herald.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const EVENTS_TOTAL: &str = "herald_events_total";
    pub const AUTHORIZATIONS_TOTAL: &str = "herald_authorizations_total";
    pub const REQUEST_SECONDS: &str = "herald_request_seconds";
    pub const ERRORS_TOTAL: &str = "herald_errors_total";
}

/// Register metric descriptions with the installed recorder.
fn describe_metrics() {
    metrics::describe_counter!(
        names::EVENTS_TOTAL,
        "Events received, labelled by dispatch outcome"
    );
    metrics::describe_counter!(
        names::AUTHORIZATIONS_TOTAL,
        "Channel authorizations, labelled by topic and result"
    );
    metrics::describe_histogram!(
        names::REQUEST_SECONDS,
        "Request handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics described");
}

/// Install the Prometheus recorder and start its HTTP listener, then
/// describe the metrics against it.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a dispatched event.
pub fn record_event(outcome: &'static str) {
    counter!(names::EVENTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an authorization decision.
pub fn record_authorization(topic: &'static str, granted: bool) {
    let result = if granted { "granted" } else { "denied" };
    counter!(names::AUTHORIZATIONS_TOTAL, "topic" => topic, "result" => result).increment(1);
}

/// Record request latency.
pub fn record_latency(route: &'static str, seconds: f64) {
    histogram!(names::REQUEST_SECONDS, "route" => route).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
