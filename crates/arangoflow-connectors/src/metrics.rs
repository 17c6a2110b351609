//! Lock-free pipeline metrics.
//!
//! Updated atomically from invocation paths, queried from anywhere via an
//! immutable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-driver invocation counters.
#[derive(Default)]
pub struct PipelineMetrics {
    /// Total invocations started.
    pub invocations_total: AtomicU64,
    /// Flow units transferred to `success`.
    pub units_out_total: AtomicU64,
    /// Records read from input flow units (ingest mode).
    pub records_in_total: AtomicU64,
    /// Documents inserted (ingest mode).
    pub inserts_total: AtomicU64,
    /// Invocations that routed to `failure` or failed outright.
    pub failures_total: AtomicU64,
}

impl PipelineMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an immutable snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            invocations_total: self.invocations_total.load(Ordering::Relaxed),
            units_out_total: self.units_out_total.load(Ordering::Relaxed),
            records_in_total: self.records_in_total.load(Ordering::Relaxed),
            inserts_total: self.inserts_total.load(Ordering::Relaxed),
            failures_total: self.failures_total.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("PipelineMetrics")
            .field("invocations_total", &snapshot.invocations_total)
            .field("units_out_total", &snapshot.units_out_total)
            .field("records_in_total", &snapshot.records_in_total)
            .field("inserts_total", &snapshot.inserts_total)
            .field("failures_total", &snapshot.failures_total)
            .finish()
    }
}

/// Immutable snapshot of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineMetricsSnapshot {
    /// Total invocations started.
    pub invocations_total: u64,
    /// Flow units transferred to `success`.
    pub units_out_total: u64,
    /// Records read from input flow units.
    pub records_in_total: u64,
    /// Documents inserted.
    pub inserts_total: u64,
    /// Failed invocations.
    pub failures_total: u64,
}
