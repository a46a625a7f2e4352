//! Operation counters exposed by the coordinator.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::rollback::RollbackReport;
use crate::types::SyncOutcome;

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatsSnapshot {
    pub operations: u64,
    pub succeeded: u64,
    pub rolled_back: u64,
    pub critical: u64,
    pub failed: u64,
    /// Requests refused by validation; also counted in `failed`
    pub rejected: u64,
    pub rollback_actions_run: u64,
    pub rollback_actions_failed: u64,
}

/// Lock-free counters updated once per synchronized operation.
///
/// A non-zero `rollback_actions_failed` means the two stores may have drifted
/// apart and need attention.
#[derive(Debug, Default)]
pub struct SyncStats {
    operations: AtomicU64,
    succeeded: AtomicU64,
    rolled_back: AtomicU64,
    critical: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    rollback_actions_run: AtomicU64,
    rollback_actions_failed: AtomicU64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_outcome(&self, outcome: SyncOutcome) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            SyncOutcome::Succeeded => &self.succeeded,
            SyncOutcome::RolledBack => &self.rolled_back,
            SyncOutcome::Critical => &self.critical,
            SyncOutcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.record_outcome(SyncOutcome::Failed);
    }

    pub(crate) fn record_rollback(&self, report: RollbackReport) {
        self.rollback_actions_run
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.rollback_actions_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rollback_actions_run: self.rollback_actions_run.load(Ordering::Relaxed),
            rollback_actions_failed: self.rollback_actions_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_are_counted_per_tier() {
        let stats = SyncStats::new();
        stats.record_outcome(SyncOutcome::Succeeded);
        stats.record_outcome(SyncOutcome::RolledBack);
        stats.record_outcome(SyncOutcome::Critical);
        stats.record_rejected();
        stats.record_rollback(RollbackReport {
            attempted: 2,
            failed: 1,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.operations, 4);
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.rolled_back, 1);
        assert_eq!(snapshot.critical, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.rollback_actions_run, 2);
        assert_eq!(snapshot.rollback_actions_failed, 1);
    }
}
