//! Per-run report for administrative visibility.

use serde::{Deserialize, Serialize};

use tasa_common::{now, CandidateRate, RunId, TasaError, Timestamp};
use tasa_engine::{PairIssue, WriteOutcome};

/// Outcome of a run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every tracked quote, candidate and write went through.
    Succeeded,
    /// The run completed but some pairs were skipped, discarded or not written.
    PartiallySucceeded,
    /// Nothing was written.
    Failed,
}

/// What one run fetched, derived and wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub status: RunStatus,
    /// Run-level error, set only when `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub quotes_attempted: usize,
    pub quotes_succeeded: usize,
    pub quote_failures: Vec<PairIssue>,
    pub candidates: Vec<CandidateRate>,
    /// Pairs whose fresh quote was replaced by a manual override.
    pub overridden: Vec<String>,
    pub skipped: Vec<PairIssue>,
    pub discarded: Vec<PairIssue>,
    pub writes: Vec<WriteOutcome>,
    /// History rows removed by retention.
    pub pruned: usize,
}

impl RunReport {
    /// Report for a run that stopped before writing anything.
    pub fn failed(run_id: RunId, started_at: Timestamp, error: &TasaError) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: now(),
            status: RunStatus::Failed,
            error: Some(error.to_string()),
            quotes_attempted: 0,
            quotes_succeeded: 0,
            quote_failures: Vec::new(),
            candidates: Vec::new(),
            overridden: Vec::new(),
            skipped: Vec::new(),
            discarded: Vec::new(),
            writes: Vec::new(),
            pruned: 0,
        }
    }

    /// Status implied by the per-pair results.
    pub fn classify(&self) -> RunStatus {
        if self.error.is_some() {
            RunStatus::Failed
        } else if self.quote_failures.is_empty()
            && self.skipped.is_empty()
            && self.discarded.is_empty()
            && self.failed_writes() == 0
        {
            RunStatus::Succeeded
        } else {
            RunStatus::PartiallySucceeded
        }
    }

    pub fn failed_writes(&self) -> usize {
        self.writes.iter().filter(|w| !w.is_success()).count()
    }

    pub fn candidate(&self, pair: &str) -> Option<&CandidateRate> {
        self.candidates.iter().find(|c| c.key.symbol() == pair)
    }

    pub fn write(&self, pair: &str) -> Option<&WriteOutcome> {
        self.writes.iter().find(|w| w.pair == pair)
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_engine::WriteStatus;

    fn empty() -> RunReport {
        let mut report = RunReport::failed(RunId::new(), now(), &TasaError::RunInProgress);
        report.error = None;
        report
    }

    #[test]
    fn test_classify() {
        let mut report = empty();
        assert_eq!(report.classify(), RunStatus::Succeeded);

        report.writes.push(WriteOutcome {
            pair: "VES-USDT".to_string(),
            status: WriteStatus::Failed,
            automatic: dec!(40),
            visible: None,
            error: Some("write rejected".to_string()),
        });
        assert_eq!(report.failed_writes(), 1);
        assert_eq!(report.classify(), RunStatus::PartiallySucceeded);
        assert!(report.write("VES-USDT").is_some());

        report.error = Some("no quotes".to_string());
        assert_eq!(report.classify(), RunStatus::Failed);
    }

    #[test]
    fn test_failed_report_serializes() {
        let error = TasaError::NoQuotesAvailable { attempted: 2, failed: 2 };
        let report = RunReport::failed(RunId::new(), now(), &error);
        assert!(!report.is_success());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"failed\""));
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
