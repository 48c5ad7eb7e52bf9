//! Counters for run monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::report::{RunReport, RunStatus};

/// Service metrics.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Runs started.
    pub runs_total: AtomicU64,
    /// Runs that ended in a run-level failure.
    pub runs_failed: AtomicU64,
    /// Triggers rejected because a run was executing.
    pub runs_rejected: AtomicU64,
    pub quotes_fetched: AtomicU64,
    pub quotes_failed: AtomicU64,
    pub candidates: AtomicU64,
    pub pairs_skipped: AtomicU64,
    pub candidates_discarded: AtomicU64,
    pub rates_written: AtomicU64,
    pub write_failures: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished run into the counters.
    pub fn record_run(&self, report: &RunReport) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        if report.status == RunStatus::Failed {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.quotes_fetched
            .fetch_add(report.quotes_succeeded as u64, Ordering::Relaxed);
        self.quotes_failed
            .fetch_add(report.quote_failures.len() as u64, Ordering::Relaxed);
        self.candidates
            .fetch_add(report.candidates.len() as u64, Ordering::Relaxed);
        self.pairs_skipped
            .fetch_add(report.skipped.len() as u64, Ordering::Relaxed);
        self.candidates_discarded
            .fetch_add(report.discarded.len() as u64, Ordering::Relaxed);

        let failed_writes = report.failed_writes() as u64;
        self.rates_written
            .fetch_add(report.writes.len() as u64 - failed_writes, Ordering::Relaxed);
        self.write_failures.fetch_add(failed_writes, Ordering::Relaxed);
    }

    /// Record a rejected trigger.
    pub fn run_rejected(&self) {
        self.runs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_rejected: self.runs_rejected.load(Ordering::Relaxed),
            quotes_fetched: self.quotes_fetched.load(Ordering::Relaxed),
            quotes_failed: self.quotes_failed.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            pairs_skipped: self.pairs_skipped.load(Ordering::Relaxed),
            candidates_discarded: self.candidates_discarded.load(Ordering::Relaxed),
            rates_written: self.rates_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_total: u64,
    pub runs_failed: u64,
    pub runs_rejected: u64,
    pub quotes_fetched: u64,
    pub quotes_failed: u64,
    pub candidates: u64,
    pub pairs_skipped: u64,
    pub candidates_discarded: u64,
    pub rates_written: u64,
    pub write_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasa_common::{now, RunId, TasaError};

    #[test]
    fn test_failed_run_is_counted() {
        let metrics = ServiceMetrics::new();
        let error = TasaError::NoQuotesAvailable { attempted: 3, failed: 3 };
        metrics.record_run(&RunReport::failed(RunId::new(), now(), &error));
        metrics.run_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_total, 1);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.runs_rejected, 1);
        assert_eq!(snapshot.rates_written, 0);
    }
}
