//! [AMBIENT] Metric surface named in §6: counters for connections
//! established, bytes in/out, requests by verb, hits/misses, and errors by
//! kind. Cardinality is fixed at startup — every field below is a plain
//! atomic, incremented on the hot path and read by the status endpoint
//! (`chunkcached::status`). The external aggregator (histograms,
//! percentiles) scrapes these; this crate only counts.

use std::sync::atomic::AtomicU64;

/// Snapshot-friendly counter set. `Default` zero-initializes everything,
/// matching how the teacher's per-request counters start at zero on daemon
/// launch.
#[derive(Default)]
pub struct Metrics {
    pub connections_established: AtomicU64,
    pub l1_connections_established: AtomicU64,
    pub l2_connections_established: AtomicU64,

    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,

    pub requests_set: AtomicU64,
    pub requests_get: AtomicU64,
    pub requests_delete: AtomicU64,
    pub requests_touch: AtomicU64,
    pub requests_gat: AtomicU64,

    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub misses: AtomicU64,

    pub l1_errors: AtomicU64,
    pub l2_errors: AtomicU64,
    pub malformed_requests: AtomicU64,
    pub client_io_errors: AtomicU64,
    /// §7 `InvariantViolation`: treated as a Miss, but counted separately
    /// so an operator can distinguish "cold cache" from "something is
    /// writing corrupt metadata."
    pub invariant_violations: AtomicU64,
}

/// A point-in-time, JSON-serializable read of every counter, for the
/// status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub connections_established: u64,
    pub l1_connections_established: u64,
    pub l2_connections_established: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub requests_set: u64,
    pub requests_get: u64,
    pub requests_delete: u64,
    pub requests_touch: u64,
    pub requests_gat: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub l1_errors: u64,
    pub l2_errors: u64,
    pub malformed_requests: u64,
    pub client_io_errors: u64,
    pub invariant_violations: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        use std::sync::atomic::Ordering::Relaxed;
        MetricsSnapshot {
            connections_established: self.connections_established.load(Relaxed),
            l1_connections_established: self.l1_connections_established.load(Relaxed),
            l2_connections_established: self.l2_connections_established.load(Relaxed),
            bytes_in: self.bytes_in.load(Relaxed),
            bytes_out: self.bytes_out.load(Relaxed),
            requests_set: self.requests_set.load(Relaxed),
            requests_get: self.requests_get.load(Relaxed),
            requests_delete: self.requests_delete.load(Relaxed),
            requests_touch: self.requests_touch.load(Relaxed),
            requests_gat: self.requests_gat.load(Relaxed),
            l1_hits: self.l1_hits.load(Relaxed),
            l2_hits: self.l2_hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            l1_errors: self.l1_errors.load(Relaxed),
            l2_errors: self.l2_errors.load(Relaxed),
            malformed_requests: self.malformed_requests.load(Relaxed),
            client_io_errors: self.client_io_errors.load(Relaxed),
            invariant_violations: self.invariant_violations.load(Relaxed),
        }
    }
}
