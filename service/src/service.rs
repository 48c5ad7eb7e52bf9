//! Run orchestration.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use tasa_common::{
    now, retention_cutoff, CurrencySymbol, PairKey, Rate, Result, RunId, TasaError, Timestamp,
};
use tasa_engine::{DerivationEngine, PairIssue, Reconciler};
use tasa_graph::{PairGraph, PairSummary};
use tasa_quote::{QuoteBatch, QuoteFetcher, QuoteRequest, QuoteSource};
use tasa_store::RateStore;

use crate::config::ServiceConfig;
use crate::metrics::ServiceMetrics;
use crate::report::RunReport;
use crate::state::ServiceState;

/// Fetch, derive and write rates on a schedule.
///
/// Runs are single-flight: a trigger that arrives while a run executes is
/// rejected, never queued. Manual-override edits wait for the running run,
/// so a run sees either all of an edit or none of it.
pub struct RateService {
    graph: Arc<RwLock<PairGraph>>,
    store: Arc<dyn RateStore>,
    fetcher: QuoteFetcher,
    engine: DerivationEngine,
    reconciler: Reconciler,
    run_interval: Duration,
    history_retention: chrono::Duration,
    run_lock: Mutex<()>,
    last_run: RwLock<Option<RunReport>>,
    state: RwLock<ServiceState>,
    metrics: Arc<ServiceMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl RateService {
    /// Create a service over a loaded graph.
    pub fn new(
        config: &ServiceConfig,
        graph: PairGraph,
        store: Arc<dyn RateStore>,
        source: Arc<dyn QuoteSource>,
    ) -> Result<Self> {
        let bridge = CurrencySymbol::parse(&config.bridge_currency)?;
        if !graph.registry().contains(&bridge) {
            warn!(bridge = %bridge, "Bridge currency is not registered; cross pairs cannot resolve");
        }

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            graph: Arc::new(RwLock::new(graph)),
            fetcher: QuoteFetcher::new(source, config.market.quote_timeout),
            engine: DerivationEngine::new(bridge),
            reconciler: Reconciler::new(store.clone()),
            store,
            run_interval: config.run_interval,
            history_retention: config.store.history_retention,
            run_lock: Mutex::new(()),
            last_run: RwLock::new(None),
            state: RwLock::new(ServiceState::Idle),
            metrics: Arc::new(ServiceMetrics::new()),
            shutdown_tx,
        })
    }

    /// Shared pair configuration. Edits take effect at the next run.
    pub fn graph_handle(&self) -> Arc<RwLock<PairGraph>> {
        self.graph.clone()
    }

    pub fn pair_summary(&self) -> Vec<PairSummary> {
        self.graph.read().summary()
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        self.metrics.clone()
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Report of the most recent finished run.
    pub fn last_run(&self) -> Option<RunReport> {
        self.last_run.read().clone()
    }

    /// Currently visible rates.
    pub async fn active_rates(&self) -> Result<Vec<Rate>> {
        self.store.active_rates().await
    }

    /// Execute one run now.
    ///
    /// Fails with `RunInProgress` if a run is executing and with
    /// `NoQuotesAvailable` when every tracked quote failed. The failed run is
    /// still recorded as the last run.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RunReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            self.metrics.run_rejected();
            warn!("Run rejected: previous run still executing");
            return Err(TasaError::RunInProgress);
        };

        let run_id = RunId::new();
        let started_at = now();
        self.transition(ServiceState::Idle, ServiceState::Running);
        info!(run_id = %run_id, "Run started");

        let result = self.execute(run_id, started_at).await;

        let report = match &result {
            Ok(report) => report.clone(),
            Err((report, _)) => report.clone(),
        };
        self.metrics.record_run(&report);
        *self.last_run.write() = Some(report);
        self.transition(ServiceState::Running, ServiceState::Idle);

        match result {
            Ok(report) => {
                info!(
                    run_id = %run_id,
                    status = ?report.status,
                    candidates = report.candidates.len(),
                    written = report.writes.len() - report.failed_writes(),
                    "Run finished"
                );
                Ok(report)
            }
            Err((_, e)) => {
                error!(run_id = %run_id, code = e.error_code(), error = %e, "Run failed");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        started_at: Timestamp,
    ) -> std::result::Result<RunReport, (RunReport, TasaError)> {
        let fail = |e: TasaError| (RunReport::failed(run_id, started_at, &e), e);

        // Both snapshots stay fixed for the whole run.
        let graph = self.graph.read().clone();
        let overrides = self.store.manual_overrides().await.map_err(fail)?;

        let batch = self.fetcher.fetch_all(quote_requests(&graph)).await;
        let quote_failures = quote_failures(&batch);

        if batch.is_total_outage() {
            let e = TasaError::NoQuotesAvailable {
                attempted: batch.attempted(),
                failed: batch.failed(),
            };
            let (mut report, e) = fail(e);
            report.quotes_attempted = batch.attempted();
            report.quote_failures = quote_failures;
            return Err((report, e));
        }

        let output = self.engine.derive(&graph, &batch.quotes, &overrides);
        let writes = self
            .reconciler
            .reconcile(output.candidates.values(), run_id, now())
            .await;

        let pruned = match retention_cutoff(self.history_retention) {
            Some(cutoff) => match self.store.prune_history(cutoff).await {
                Ok(pruned) => pruned,
                Err(e) => {
                    warn!(error = %e, "History pruning failed");
                    0
                }
            },
            None => {
                warn!(
                    retention_days = self.history_retention.num_days(),
                    "Retention window out of range; pruning skipped"
                );
                0
            }
        };

        let mut report = RunReport {
            run_id,
            started_at,
            finished_at: now(),
            status: crate::report::RunStatus::Succeeded,
            error: None,
            quotes_attempted: batch.attempted(),
            quotes_succeeded: batch.succeeded(),
            quote_failures,
            candidates: output.candidates.into_values().collect(),
            overridden: output.overridden.iter().map(PairKey::symbol).collect(),
            skipped: output.skipped,
            discarded: output.discarded,
            writes,
            pruned,
        };
        report.status = report.classify();
        Ok(report)
    }

    /// Run on a fixed interval until [`stop`](Self::stop) is called.
    ///
    /// The first run starts immediately. Ticks missed while a run executes
    /// are skipped.
    pub async fn run_loop(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        if *shutdown.borrow() {
            *self.state.write() = ServiceState::Stopped;
            return;
        }

        let mut ticker = tokio::time::interval(self.run_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.run_interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are already logged and recorded in the report.
                    let _ = self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        *self.state.write() = ServiceState::Stopped;
        info!("Scheduler stopped");
    }

    /// Ask the scheduler loop to exit after the current run.
    pub fn stop(&self) {
        *self.state.write() = ServiceState::ShuttingDown;
        self.shutdown_tx.send_replace(true);
        info!("Shutdown requested");
    }

    /// Pin a manual rate on a configured pair.
    #[instrument(skip(self), fields(pair = %key))]
    pub async fn set_manual_override(&self, key: &PairKey, value: Decimal) -> Result<Rate> {
        if value <= Decimal::ZERO {
            return Err(TasaError::config(key.symbol(), "manual rate must be positive"));
        }
        self.require_pair(key)?;

        let _guard = self.run_lock.lock().await;
        self.store.set_manual(key, value, now()).await
    }

    /// Remove the manual rate of a pair, restoring its automatic value.
    #[instrument(skip(self), fields(pair = %key))]
    pub async fn clear_manual_override(&self, key: &PairKey) -> Result<Option<Rate>> {
        let _guard = self.run_lock.lock().await;
        self.store.clear_manual(key, now()).await
    }

    fn require_pair(&self, key: &PairKey) -> Result<()> {
        match self.graph.read().get_by_key(key) {
            Some(_) => Ok(()),
            None => Err(TasaError::NotFound(format!("pair {}", key))),
        }
    }

    fn transition(&self, from: ServiceState, to: ServiceState) {
        let mut state = self.state.write();
        if *state == from {
            *state = to;
        }
    }
}

/// One marketplace query per tracked pair that can be quoted.
pub fn quote_requests(graph: &PairGraph) -> Vec<QuoteRequest> {
    let mut requests = Vec::new();
    for pair in graph.list_tracked_pairs() {
        let key = match graph.quote_key_for(pair) {
            Ok(key) => key,
            Err(e) => {
                warn!(pair = %pair.pair_symbol(), error = %e, "Tracked pair has no quote query");
                continue;
            }
        };
        let Some(probe_amount) = pair.probe_amount else {
            warn!(pair = %pair.pair_symbol(), "Tracked pair has no probe amount");
            continue;
        };
        requests.push(QuoteRequest::new(key, pair.filter_set.clone(), probe_amount));
    }
    requests
}

fn quote_failures(batch: &QuoteBatch) -> Vec<PairIssue> {
    batch
        .failures
        .iter()
        .map(|(key, e)| {
            let pair = key.pair_key().symbol();
            PairIssue::new(pair.clone(), &e.clone().into_tasa(pair))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_common::{Direction, QuoteKey};
    use tasa_graph::PairsFile;
    use tasa_quote::StaticQuoteSource;
    use tasa_store::InMemoryRateStore;
    use tokio_test::{assert_err, assert_ok};

    use crate::report::RunStatus;

    const SEED: &str = r#"{
        "currencies": [
            {"symbol": "VES", "kind": "FIAT"},
            {"symbol": "COP", "kind": "FIAT"},
            {"symbol": "ZELLE", "kind": "FIAT"},
            {"symbol": "USDT", "kind": "CRYPTO"}
        ],
        "pairs": [
            {"from": "VES", "to": "USDT", "type": "base", "tracked": true,
             "filter_set": ["BANK"], "probe_amount": "20000"},
            {"from": "USDT", "to": "COP", "type": "base", "tracked": true,
             "filter_set": ["BancolombiaSA"], "probe_amount": "500000"},
            {"from": "VES", "to": "ZELLE", "type": "derived", "base": "VES-USDT",
             "percentage": "5", "inverse": true},
            {"from": "VES", "to": "COP", "type": "cross", "percentage": "8"}
        ]
    }"#;

    fn sym(s: &str) -> CurrencySymbol {
        CurrencySymbol::parse(s).unwrap()
    }

    fn ves_usdt() -> QuoteKey {
        QuoteKey::new(sym("VES"), sym("USDT"), Direction::Buy)
    }

    fn usdt_cop() -> QuoteKey {
        QuoteKey::new(sym("COP"), sym("USDT"), Direction::Sell)
    }

    fn pair(from: &str, to: &str) -> PairKey {
        PairKey::new(sym(from), sym(to))
    }

    fn service() -> (RateService, Arc<StaticQuoteSource>, Arc<InMemoryRateStore>) {
        let graph = PairGraph::from_seed(PairsFile::from_json(SEED).unwrap()).unwrap();
        let source = Arc::new(StaticQuoteSource::new());
        let store = Arc::new(InMemoryRateStore::new());
        let service = RateService::new(&ServiceConfig::default(), graph, store.clone(), source.clone())
            .unwrap();
        (service, source, store)
    }

    #[tokio::test]
    async fn test_full_run_writes_every_pair() {
        let (service, source, store) = service();
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));

        let report = service.run_once().await.unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.quotes_succeeded, 2);
        assert_eq!(report.candidates.len(), 4);
        assert_eq!(report.candidate("VES-ZELLE").unwrap().value, dec!(42));
        assert_eq!(report.candidate("VES-COP").unwrap().value, dec!(0.0092));
        assert_eq!(store.active_rates().await.unwrap().len(), 4);
        assert_eq!(service.last_run(), Some(report));
        assert_eq!(service.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn test_failed_quote_skips_dependents_only() {
        let (service, source, store) = service();
        source.set_quote(ves_usdt(), dec!(40));
        source.set_failure(usdt_cop(), "no adverts");

        let report = service.run_once().await.unwrap();

        assert_eq!(report.status, RunStatus::PartiallySucceeded);
        assert_eq!(report.quote_failures.len(), 1);
        assert_eq!(report.quote_failures[0].code, "QUOTE_UNAVAILABLE");
        assert!(report.candidate("VES-COP").is_none());
        assert!(report.candidate("VES-ZELLE").is_some());
        assert!(store.latest_active(&pair("VES", "COP")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_total_outage_fails_run() {
        let (service, source, store) = service();
        source.set_failure(ves_usdt(), "down");
        source.set_failure(usdt_cop(), "down");

        let err = service.run_once().await.unwrap_err();

        assert_eq!(err.error_code(), "NO_QUOTES_AVAILABLE");
        let report = service.last_run().unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.quotes_attempted, 2);
        assert_eq!(store.row_count(), 0);
        assert_eq!(service.metrics().snapshot().runs_failed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let graph = PairGraph::from_seed(PairsFile::from_json(SEED).unwrap()).unwrap();
        let source = Arc::new(StaticQuoteSource::new().with_delay(Duration::from_millis(200)));
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));
        let store = Arc::new(InMemoryRateStore::new());
        let service = Arc::new(
            RateService::new(&ServiceConfig::default(), graph, store, source).unwrap(),
        );

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = service.run_once().await.unwrap_err();
        assert_eq!(err.error_code(), "RUN_IN_PROGRESS");
        assert_ok!(first.await.unwrap());
        assert_eq!(service.metrics().snapshot().runs_rejected, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_retention_skips_pruning() {
        let graph = PairGraph::from_seed(PairsFile::from_json(SEED).unwrap()).unwrap();
        let source = Arc::new(StaticQuoteSource::new());
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));
        let mut config = ServiceConfig::default();
        config.store.history_retention = chrono::Duration::days(100_000_000);
        let service = RateService::new(&config, graph, Arc::new(InMemoryRateStore::new()), source).unwrap();

        let report = assert_ok!(service.run_once().await);
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.pruned, 0);
    }

    #[tokio::test]
    async fn test_manual_override_survives_runs() {
        let (service, source, store) = service();
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));
        service.run_once().await.unwrap();

        assert_ok!(service.set_manual_override(&pair("VES", "USDT"), dec!(50)).await);
        source.set_quote(ves_usdt(), dec!(41));
        let report = service.run_once().await.unwrap();

        assert_eq!(report.overridden, vec!["VES-USDT".to_string()]);
        // Derived pairs follow the override.
        assert_eq!(report.candidate("VES-ZELLE").unwrap().value, dec!(52.5));

        let active = store.latest_active(&pair("VES", "USDT")).await.unwrap().unwrap();
        assert_eq!(active.value(), dec!(50));
        assert_eq!(active.automatic_value(), Some(dec!(41)));

        let restored = service.clear_manual_override(&pair("VES", "USDT")).await.unwrap();
        assert_eq!(restored.unwrap().value(), dec!(41));
    }

    #[tokio::test]
    async fn test_manual_override_validation() {
        let (service, _, _) = service();
        assert_err!(service.set_manual_override(&pair("VES", "USDT"), dec!(0)).await);

        let err = service
            .set_manual_override(&pair("BRL", "USDT"), dec!(5))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_graph_edits_apply_next_run() {
        let (service, source, _) = service();
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));

        {
            let handle = service.graph_handle();
            let mut graph = handle.write();
            let id = graph.get_by_key(&pair("VES", "COP")).unwrap().id;
            graph.set_active(id, false).unwrap();
        }

        let report = service.run_once().await.unwrap();
        assert!(report.candidate("VES-COP").is_none());
        assert_eq!(report.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_loop_stops() {
        let (service, source, _) = service();
        source.set_quote(ves_usdt(), dec!(40));
        source.set_quote(usdt_cop(), dec!(4000));
        let service = Arc::new(service);

        let handle = {
            let service = service.clone();
            tokio::spawn(async move { service.run_loop().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.stop();
        handle.await.unwrap();

        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(service.last_run().is_some());
    }
}
