//! Simulation controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::{info, warn};

use tasa_common::{PairKey, QuoteKey};
use tasa_graph::{parse_pair_symbol, PairGraph};
use tasa_quote::StaticQuoteSource;
use tasa_service::{RateService, RunReport, ServiceConfig};
use tasa_store::InMemoryRateStore;

use crate::metrics::SimulationMetrics;
use crate::scenario::{Round, Scenario};

/// Randomisation applied to scripted quotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noise {
    /// Maximum price move per round, in basis points either way.
    pub jitter_bps: u32,
    /// Chance, in percent, that a quote fails.
    pub failure_pct: u8,
}

/// Drives a scenario through a real rate service.
pub struct SimulationController {
    scenario: Scenario,
    service: RateService,
    source: Arc<StaticQuoteSource>,
    /// Quote query behind each tracked pair symbol.
    quote_keys: BTreeMap<String, QuoteKey>,
    /// Unjittered prices, updated by each round.
    prices: BTreeMap<String, Decimal>,
    noise: Noise,
    rng: StdRng,
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(scenario: Scenario, noise: Noise, seed: Option<u64>) -> anyhow::Result<Self> {
        let seed_file = scenario
            .pairs
            .clone()
            .ok_or_else(|| anyhow::anyhow!("scenario {} has no pairs", scenario.name))?;
        let graph = PairGraph::from_seed(seed_file)?;

        let mut quote_keys = BTreeMap::new();
        for pair in graph.list_tracked_pairs() {
            quote_keys.insert(pair.pair_symbol(), graph.quote_key_for(pair)?);
        }

        let config = ServiceConfig {
            bridge_currency: scenario.bridge.clone(),
            ..ServiceConfig::default()
        };
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let source = Arc::new(StaticQuoteSource::new());
        let store = Arc::new(InMemoryRateStore::new());
        let service = RateService::new(&config, graph, store, source.clone())?;

        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            prices: scenario.quotes.clone(),
            scenario,
            service,
            source,
            quote_keys,
            noise,
            rng,
            metrics: SimulationMetrics::new(),
        })
    }

    /// Run `rounds` rounds, returning each round's report.
    pub async fn run(&mut self, rounds: usize) -> anyhow::Result<Vec<RunReport>> {
        info!(
            scenario = %self.scenario.name,
            rounds,
            tracked = self.quote_keys.len(),
            "Running scenario"
        );

        let mut reports = Vec::with_capacity(rounds);
        for index in 0..rounds {
            let round = self.scenario.round(index);
            self.apply_overrides(&round).await?;
            self.script_quotes(&round);

            let report = match self.service.run_once().await {
                Ok(report) => report,
                Err(e) => {
                    warn!(round = index, error = %e, "Round failed");
                    self.service
                        .last_run()
                        .ok_or_else(|| anyhow::anyhow!("round {} left no report: {}", index, e))?
                }
            };
            self.metrics.record(&report);
            self.check_expectations(index, &round).await?;
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    async fn apply_overrides(&self, round: &Round) -> anyhow::Result<()> {
        for symbol in &round.clear_overrides {
            let key = parse_pair_symbol(symbol)?;
            if let Err(e) = self.service.clear_manual_override(&key).await {
                warn!(pair = %symbol, error = %e, "Override not cleared");
            }
        }
        for (symbol, value) in &round.set_overrides {
            let key = parse_pair_symbol(symbol)?;
            self.service.set_manual_override(&key, *value).await?;
        }
        Ok(())
    }

    fn script_quotes(&mut self, round: &Round) {
        self.prices
            .extend(round.quotes.iter().map(|(symbol, price)| (symbol.clone(), *price)));

        for (symbol, key) in &self.quote_keys {
            let scripted_failure = round.failures.contains(symbol);
            let injected_failure = self.noise.failure_pct > 0
                && self.rng.gen_range(0..100u8) < self.noise.failure_pct;

            match self.prices.get(symbol) {
                Some(_) if scripted_failure => self.source.set_failure(key.clone(), "scripted outage"),
                Some(_) if injected_failure => self.source.set_failure(key.clone(), "injected failure"),
                Some(price) => {
                    let price = jitter(*price, self.noise.jitter_bps, &mut self.rng);
                    self.source.set_quote(key.clone(), price);
                }
                None => self.source.clear(key),
            }
        }
    }

    async fn check_expectations(&mut self, index: usize, round: &Round) -> anyhow::Result<()> {
        if round.expect.is_empty() {
            return Ok(());
        }

        let visible: BTreeMap<PairKey, Decimal> = self
            .service
            .active_rates()
            .await?
            .into_iter()
            .map(|rate| (rate.key.clone(), rate.value()))
            .collect();

        for (symbol, expected) in &round.expect {
            let key = parse_pair_symbol(symbol)?;
            let actual = visible.get(&key).copied();
            if actual == Some(*expected) {
                info!(round = index, pair = %symbol, value = %expected, "Expectation met");
            } else {
                warn!(
                    round = index,
                    pair = %symbol,
                    expected = %expected,
                    actual = ?actual,
                    "Expectation failed"
                );
                self.metrics.record_expectation_failure();
            }
        }
        Ok(())
    }
}

/// Move `price` by a uniform random amount of at most `bps` basis points.
fn jitter(price: Decimal, bps: u32, rng: &mut StdRng) -> Decimal {
    if bps == 0 {
        return price;
    }
    let bps = i64::from(bps);
    let delta = rng.gen_range(-bps..=bps);
    (price * (Decimal::ONE + Decimal::new(delta, 4))).normalize()
}
