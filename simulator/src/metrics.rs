//! Simulation metrics.

use tasa_service::{RunReport, RunStatus};

/// Totals across all rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationMetrics {
    pub rounds: u64,
    pub succeeded: u64,
    pub partial: u64,
    pub failed: u64,
    pub candidates: u64,
    pub quote_failures: u64,
    pub write_failures: u64,
    /// Expected visible rates that did not match.
    pub expectation_failures: u64,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one round's report.
    pub fn record(&mut self, report: &RunReport) {
        self.rounds += 1;
        match report.status {
            RunStatus::Succeeded => self.succeeded += 1,
            RunStatus::PartiallySucceeded => self.partial += 1,
            RunStatus::Failed => self.failed += 1,
        }
        self.candidates += report.candidates.len() as u64;
        self.quote_failures += report.quote_failures.len() as u64;
        self.write_failures += report.failed_writes() as u64;
    }

    pub fn record_expectation_failure(&mut self) {
        self.expectation_failures += 1;
    }

    pub fn all_expectations_met(&self) -> bool {
        self.expectation_failures == 0
    }
}
