//! Metrics recording for Tideway
//!
//! [`crate::server::probe::ServerProbe`] forwards every probe event to the
//! functions below. With the `metrics` feature they feed the `metrics` facade
//! and can be scraped through a Prometheus exporter; without it every
//! function is a no-op with the same signature.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::Result;

// ============================================================================
// Exporter
// ============================================================================

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
#[cfg(feature = "metrics")]
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| crate::error::TidewayError::server("install metrics exporter", e.to_string()))?;
    describe_metrics();
    Ok(())
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    describe_gauge!(
        "tideway_connections_active",
        "Number of currently open client connections"
    );
    describe_counter!(
        "tideway_connections_total",
        "Total client connections accepted"
    );
    describe_counter!(
        "tideway_connection_close_errors_total",
        "Connections whose shutdown reported an error"
    );
    describe_counter!("tideway_bytes_received_total", "Bytes read from clients");
    describe_counter!("tideway_bytes_sent_total", "Bytes written to clients");
    describe_counter!(
        "tideway_requests_total",
        "Requests answered, by API key and outcome"
    );
    describe_histogram!(
        "tideway_request_duration_seconds",
        "Time from frame decode to response encode"
    );
    describe_counter!(
        "tideway_protocol_violations_total",
        "Connections closed for framing or decode violations"
    );
    describe_counter!(
        "tideway_admission_deferred_total",
        "Handler invocations that waited for an execution slot"
    );
}

// ============================================================================
// Recording functions - with metrics feature
// ============================================================================

/// Record an active connection change
#[cfg(feature = "metrics")]
pub fn record_connection_active(delta: i64) {
    if delta > 0 {
        gauge!("tideway_connections_active").increment(delta as f64);
        counter!("tideway_connections_total").increment(delta as u64);
    } else {
        gauge!("tideway_connections_active").decrement(delta.unsigned_abs() as f64);
    }
}

#[cfg(feature = "metrics")]
pub fn record_connection_close_error() {
    counter!("tideway_connection_close_errors_total").increment(1);
}

#[cfg(feature = "metrics")]
pub fn record_bytes_received(bytes: u64) {
    counter!("tideway_bytes_received_total").increment(bytes);
}

#[cfg(feature = "metrics")]
pub fn record_bytes_sent(bytes: u64) {
    counter!("tideway_bytes_sent_total").increment(bytes);
}

/// Record a finished request with its outcome
#[cfg(feature = "metrics")]
pub fn record_request(api_key: i16, outcome: &'static str, duration: Option<Duration>) {
    counter!("tideway_requests_total", "api_key" => api_key.to_string(), "outcome" => outcome)
        .increment(1);
    if let Some(duration) = duration {
        histogram!("tideway_request_duration_seconds", "api_key" => api_key.to_string())
            .record(duration.as_secs_f64());
    }
}

#[cfg(feature = "metrics")]
pub fn record_protocol_violation() {
    counter!("tideway_protocol_violations_total").increment(1);
}

#[cfg(feature = "metrics")]
pub fn record_admission_deferred() {
    counter!("tideway_admission_deferred_total").increment(1);
}

// ============================================================================
// No-op versions - without metrics feature
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    tracing::warn!(%addr, "metrics feature disabled, exporter not installed");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_connection_active(_delta: i64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_connection_close_error() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_bytes_received(_bytes: u64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_bytes_sent(_bytes: u64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_request(_api_key: i16, _outcome: &'static str, _duration: Option<Duration>) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_protocol_violation() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_admission_deferred() {}
