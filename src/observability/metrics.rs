//! Metrics registry
//!
//! - Counters only, monotonic, reset on process start
//! - Thread-safe via relaxed atomics
//! - Passive: reading metrics never changes behavior

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by every group of a node.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    reads_fast_path: AtomicU64,
    reads_queued: AtomicU64,
    reads_released: AtomicU64,
    reads_timed_out: AtomicU64,
    reads_rejected_no_leader: AtomicU64,
    reads_rejected_unavailable: AtomicU64,
    writes_applied: AtomicU64,
    writes_rejected: AtomicU64,
    entries_applied: AtomicU64,
    entries_replayed: AtomicU64,
    apply_failures: AtomicU64,
    snapshots_taken: AtomicU64,
    snapshots_restored: AtomicU64,
    recoveries_completed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Read path

    pub fn increment_reads_fast_path(&self) {
        self.reads_fast_path.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reads_queued(&self) {
        self.reads_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_reads_released(&self, count: u64) {
        self.reads_released.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_reads_timed_out(&self) {
        self.reads_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reads_rejected_no_leader(&self) {
        self.reads_rejected_no_leader.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reads_rejected_unavailable(&self) {
        self.reads_rejected_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    // Write path

    pub fn increment_writes_applied(&self) {
        self.writes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_rejected(&self) {
        self.writes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Apply

    /// Count an applied entry; `replay` marks entries applied while recovering.
    pub fn increment_entries_applied(&self, replay: bool) {
        self.entries_applied.fetch_add(1, Ordering::Relaxed);
        if replay {
            self.entries_replayed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Snapshot & recovery

    pub fn increment_snapshots_taken(&self) {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots_restored(&self) {
        self.snapshots_restored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recoveries_completed(&self) {
        self.recoveries_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reads_fast_path: self.reads_fast_path.load(Ordering::Relaxed),
            reads_queued: self.reads_queued.load(Ordering::Relaxed),
            reads_released: self.reads_released.load(Ordering::Relaxed),
            reads_timed_out: self.reads_timed_out.load(Ordering::Relaxed),
            reads_rejected_no_leader: self.reads_rejected_no_leader.load(Ordering::Relaxed),
            reads_rejected_unavailable: self.reads_rejected_unavailable.load(Ordering::Relaxed),
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            entries_applied: self.entries_applied.load(Ordering::Relaxed),
            entries_replayed: self.entries_replayed.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            snapshots_taken: self.snapshots_taken.load(Ordering::Relaxed),
            snapshots_restored: self.snapshots_restored.load(Ordering::Relaxed),
            recoveries_completed: self.recoveries_completed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reads_fast_path: u64,
    pub reads_queued: u64,
    pub reads_released: u64,
    pub reads_timed_out: u64,
    pub reads_rejected_no_leader: u64,
    pub reads_rejected_unavailable: u64,
    pub writes_applied: u64,
    pub writes_rejected: u64,
    pub entries_applied: u64,
    pub entries_replayed: u64,
    pub apply_failures: u64,
    pub snapshots_taken: u64,
    pub snapshots_restored: u64,
    pub recoveries_completed: u64,
}

impl MetricsSnapshot {
    /// Serialize as a single JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
