//! Write-back of candidate rates.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use tasa_common::{CandidateRate, NewRate, PairKey, Result, RunId, Timestamp};
use tasa_store::RateStore;

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// New automatic row is active.
    Written,
    /// Pair is manually overridden; only the shadow value moved.
    ShadowUpdated,
    /// Store rejected the write. The next run retries.
    Failed,
}

/// Per-pair write report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub pair: String,
    pub status: WriteStatus,
    /// Computed value.
    pub automatic: Decimal,
    /// Value consumers see after the write.
    pub visible: Option<Decimal>,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        self.status != WriteStatus::Failed
    }
}

/// Merges candidates into the rate store.
///
/// Each pair is written independently; one failing pair does not stop the
/// rest. Callers must keep manual-override edits out of a running
/// reconciliation so the active row read here is still active on append.
pub struct Reconciler {
    store: Arc<dyn RateStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    /// Write every candidate and report per pair.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn reconcile<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a CandidateRate>,
        run_id: RunId,
        observed_at: Timestamp,
    ) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();

        for candidate in candidates {
            let outcome = match self.write(candidate, run_id, observed_at).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(pair = %candidate.key, error = %e, "Rate write failed");
                    WriteOutcome {
                        pair: candidate.key.symbol(),
                        status: WriteStatus::Failed,
                        automatic: candidate.value,
                        visible: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(written = outcomes.len() - failed, failed, "Write-back complete");
        outcomes
    }

    async fn write(&self, candidate: &CandidateRate, run_id: RunId, observed_at: Timestamp) -> Result<WriteOutcome> {
        let key: &PairKey = &candidate.key;
        let row = NewRate::from_candidate(candidate, observed_at, run_id);

        let (row, status) = match self.store.latest_active(key).await? {
            Some(active) if active.is_manual() => {
                let state = active.state.with_automatic(candidate.value);
                (row.with_state(state), WriteStatus::ShadowUpdated)
            }
            _ => (row, WriteStatus::Written),
        };

        let rate = self.store.append_and_activate(row).await?;
        debug!(pair = %key, visible = %rate.value(), status = ?status, "Rate written");

        Ok(WriteOutcome {
            pair: key.symbol(),
            status,
            automatic: candidate.value,
            visible: Some(rate.value()),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_common::{now, CurrencySymbol, PairType, RateSource};
    use tasa_store::InMemoryRateStore;

    fn key(from: &str, to: &str) -> PairKey {
        PairKey::new(
            CurrencySymbol::parse(from).unwrap(),
            CurrencySymbol::parse(to).unwrap(),
        )
    }

    fn candidate(key: PairKey, value: Decimal) -> CandidateRate {
        CandidateRate {
            key,
            value,
            source: RateSource::Quote,
            pair_type: PairType::Base,
            percentage: None,
            inverse_percentage: false,
        }
    }

    #[tokio::test]
    async fn test_new_pair_is_written() {
        let store = Arc::new(InMemoryRateStore::new());
        let reconciler = Reconciler::new(store.clone());
        let k = key("VES", "USDT");

        let outcomes = reconciler
            .reconcile([&candidate(k.clone(), dec!(40))], RunId::new(), now())
            .await;

        assert_eq!(outcomes[0].status, WriteStatus::Written);
        let active = store.latest_active(&k).await.unwrap().unwrap();
        assert_eq!(active.value(), dec!(40));
        assert_eq!(active.source, "quote");
    }

    #[tokio::test]
    async fn test_manual_override_keeps_visible_value() {
        let store = Arc::new(InMemoryRateStore::new());
        let reconciler = Reconciler::new(store.clone());
        let k = key("VES", "USDT");

        reconciler.reconcile([&candidate(k.clone(), dec!(40))], RunId::new(), now()).await;
        store.set_manual(&k, dec!(42), now()).await.unwrap();

        let outcomes = reconciler
            .reconcile([&candidate(k.clone(), dec!(41))], RunId::new(), now())
            .await;
        assert_eq!(outcomes[0].status, WriteStatus::ShadowUpdated);
        assert_eq!(outcomes[0].visible, Some(dec!(42)));

        let active = store.latest_active(&k).await.unwrap().unwrap();
        assert_eq!(active.value(), dec!(42));
        assert_eq!(active.automatic_value(), Some(dec!(41)));

        // Shadow moves are new rows, never edits.
        assert_eq!(store.history(&k).await.unwrap().len(), 3);

        let restored = store.clear_manual(&k, now()).await.unwrap().unwrap();
        assert_eq!(restored.value(), dec!(41));
    }

    #[tokio::test]
    async fn test_failed_pair_does_not_stop_others() {
        let store = Arc::new(InMemoryRateStore::new());
        store.fail_writes_for(key("USDT", "COP"));
        let reconciler = Reconciler::new(store.clone());

        let candidates = [
            candidate(key("USDT", "COP"), dec!(4000)),
            candidate(key("VES", "USDT"), dec!(40)),
        ];
        let outcomes = reconciler.reconcile(candidates.iter(), RunId::new(), now()).await;

        assert_eq!(outcomes[0].status, WriteStatus::Failed);
        assert!(outcomes[0].error.as_deref().unwrap_or_default().contains("USDT-COP"));
        assert_eq!(outcomes[1].status, WriteStatus::Written);
        assert!(store.latest_active(&key("USDT", "COP")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rows_carry_run_id() {
        let store = Arc::new(InMemoryRateStore::new());
        let reconciler = Reconciler::new(store.clone());
        let run_id = RunId::new();
        let k = key("VES", "USDT");

        reconciler.reconcile([&candidate(k.clone(), dec!(40))], run_id, now()).await;

        let active = store.latest_active(&k).await.unwrap().unwrap();
        assert_eq!(active.run_id, Some(run_id));
    }
}
