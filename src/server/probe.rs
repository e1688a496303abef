//! Connection and dispatch instrumentation
//!
//! The [`Probe`] trait is the sink the connection and the dispatcher report
//! to. Every method has a no-op default so tests can implement only what
//! they observe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::ErrorCode;
use crate::metrics;

/// Instrumentation sink for connection and request events
pub trait Probe: Send + Sync + 'static {
    fn connection_established(&self) {}

    /// Emitted exactly once per connection, from its first `shutdown`
    fn connection_closed(&self) {}

    fn connection_close_error(&self) {}

    fn add_bytes_sent(&self, _bytes: usize) {}

    fn add_bytes_received(&self, _bytes: usize) {}

    fn request_received(&self, _api_key: i16) {}

    fn request_completed(&self, _api_key: i16, _elapsed: Duration) {}

    /// A request answered with an error response instead of a handler result
    fn request_rejected(&self, _api_key: i16, _code: ErrorCode) {}

    /// The peer broke the framing or decode contract
    fn protocol_violation(&self) {}

    /// A handler invocation had to wait for an execution slot
    fn admission_deferred(&self) {}

    fn handler_failed(&self, _api_key: i16) {}
}

/// Probe that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProbe;

impl Probe for NoopProbe {}

/// Point-in-time copy of [`ServerProbe`] counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSnapshot {
    pub connections_established: u64,
    pub connections_closed: u64,
    pub connection_close_errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub requests_received: u64,
    pub requests_completed: u64,
    pub requests_rejected: u64,
    pub protocol_violations: u64,
    pub admission_deferred: u64,
    pub handler_failures: u64,
}

impl ProbeSnapshot {
    pub fn connections_active(&self) -> u64 {
        self.connections_established
            .saturating_sub(self.connections_closed)
    }
}

/// Counting probe used by the broker. Also feeds [`crate::metrics`].
#[derive(Debug, Default)]
pub struct ServerProbe {
    connections_established: AtomicU64,
    connections_closed: AtomicU64,
    connection_close_errors: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    requests_received: AtomicU64,
    requests_completed: AtomicU64,
    requests_rejected: AtomicU64,
    protocol_violations: AtomicU64,
    admission_deferred: AtomicU64,
    handler_failures: AtomicU64,
}

impl ServerProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        ProbeSnapshot {
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connection_close_errors: self.connection_close_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            admission_deferred: self.admission_deferred.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

impl Probe for ServerProbe {
    fn connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_active(1);
    }

    fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_active(-1);
    }

    fn connection_close_error(&self) {
        self.connection_close_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_close_error();
    }

    fn add_bytes_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::record_bytes_sent(bytes as u64);
    }

    fn add_bytes_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::record_bytes_received(bytes as u64);
    }

    fn request_received(&self, _api_key: i16) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    fn request_completed(&self, api_key: i16, elapsed: Duration) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
        metrics::record_request(api_key, "ok", Some(elapsed));
    }

    fn request_rejected(&self, api_key: i16, _code: ErrorCode) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
        metrics::record_request(api_key, "rejected", None);
    }

    fn protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
        metrics::record_protocol_violation();
    }

    fn admission_deferred(&self) {
        self.admission_deferred.fetch_add(1, Ordering::Relaxed);
        metrics::record_admission_deferred();
    }

    fn handler_failed(&self, api_key: i16) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_request(api_key, "failed", None);
    }
}
