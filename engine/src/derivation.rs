//! Rate derivation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tasa_common::{
    CandidateRate, CurrencyPair, CurrencySymbol, Margin, PairId, PairKey, PairType, QuoteKey,
    RateSource, TasaError,
};
use tasa_graph::PairGraph;

/// A pair left out of a run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairIssue {
    pub pair: String,
    pub code: String,
    pub message: String,
}

impl PairIssue {
    pub fn new(pair: impl Into<String>, error: &TasaError) -> Self {
        Self {
            pair: pair.into(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result of one derivation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationOutput {
    /// One candidate per ordered pair.
    pub candidates: BTreeMap<PairKey, CandidateRate>,
    /// Step 1 inputs: overrides merged over fresh quotes.
    pub effective: BTreeMap<PairKey, Decimal>,
    /// Pairs whose fresh quote was replaced by a manual override.
    pub overridden: Vec<PairKey>,
    /// Pairs not computed: bad configuration or missing inputs.
    pub skipped: Vec<PairIssue>,
    /// Pairs computed to an unusable value.
    pub discarded: Vec<PairIssue>,
}

impl DerivationOutput {
    pub fn candidate(&self, key: &PairKey) -> Option<&CandidateRate> {
        self.candidates.get(key)
    }

    fn skip(&mut self, pair: &CurrencyPair, error: TasaError) {
        warn!(pair = %pair.pair_symbol(), code = error.error_code(), error = %error, "Pair skipped");
        self.skipped.push(PairIssue::new(pair.pair_symbol(), &error));
    }

    fn discard(&mut self, pair: &CurrencyPair, reason: impl Into<String>) {
        let error = TasaError::InvalidComputation {
            pair: pair.pair_symbol(),
            reason: reason.into(),
        };
        warn!(pair = %pair.pair_symbol(), error = %error, "Candidate discarded");
        self.discarded.push(PairIssue::new(pair.pair_symbol(), &error));
    }

    fn push(&mut self, candidate: CandidateRate) {
        if self.candidates.contains_key(&candidate.key) {
            warn!(pair = %candidate.key, "Duplicate candidate dropped");
            return;
        }
        debug!(candidate = %candidate, "Candidate computed");
        self.candidates.insert(candidate.key.clone(), candidate);
    }
}

/// Derives the full rate set for one run.
#[derive(Debug, Clone)]
pub struct DerivationEngine {
    bridge: CurrencySymbol,
}

impl DerivationEngine {
    /// Create an engine bridging cross pairs through `bridge`.
    pub fn new(bridge: CurrencySymbol) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &CurrencySymbol {
        &self.bridge
    }

    /// Derive every runnable pair of `graph`.
    ///
    /// `base_quotes` holds this run's successful marketplace quotes and
    /// `manual_overrides` the manual values of active rows. The output
    /// depends on nothing else.
    #[instrument(skip_all, fields(quotes = base_quotes.len(), overrides = manual_overrides.len()))]
    pub fn derive(
        &self,
        graph: &PairGraph,
        base_quotes: &BTreeMap<QuoteKey, Decimal>,
        manual_overrides: &BTreeMap<PairKey, Decimal>,
    ) -> DerivationOutput {
        let mut output = DerivationOutput::default();

        let fresh: BTreeMap<PairKey, Decimal> = base_quotes
            .iter()
            .map(|(key, price)| (key.pair_key(), *price))
            .collect();
        self.merge_effective(graph, &mut output, &fresh, manual_overrides);

        self.derive_base(graph, &fresh, manual_overrides, &mut output);
        self.derive_derived(graph, &mut output);
        self.derive_cross(graph, &mut output);

        info!(
            candidates = output.candidates.len(),
            overridden = output.overridden.len(),
            skipped = output.skipped.len(),
            discarded = output.discarded.len(),
            "Derivation complete"
        );
        output
    }

    /// Overrides count only for pairs taking part in the run; a deactivated
    /// or removed pair keeps its manual row but feeds nothing.
    fn merge_effective(
        &self,
        graph: &PairGraph,
        output: &mut DerivationOutput,
        fresh: &BTreeMap<PairKey, Decimal>,
        manual_overrides: &BTreeMap<PairKey, Decimal>,
    ) {
        output.effective = fresh.clone();
        for (key, manual) in manual_overrides {
            if !graph.get_by_key(key).is_some_and(|pair| pair.is_runnable()) {
                debug!(pair = %key, "Override on a pair outside the run ignored");
                continue;
            }
            if let Some(quote) = fresh.get(key) {
                info!(pair = %key, quote = %quote, manual = %manual, "Manual override replaces quote");
                output.overridden.push(key.clone());
            }
            output.effective.insert(key.clone(), *manual);
        }
    }

    fn derive_base(
        &self,
        graph: &PairGraph,
        fresh: &BTreeMap<PairKey, Decimal>,
        manual_overrides: &BTreeMap<PairKey, Decimal>,
        output: &mut DerivationOutput,
    ) {
        for pair in graph.list_base_pairs() {
            if let Err(e) = graph.validate(pair) {
                output.skip(pair, e);
                continue;
            }

            let key = pair.key();
            match fresh.get(&key) {
                Some(quote) => output.push(CandidateRate {
                    key,
                    value: *quote,
                    source: RateSource::Quote,
                    pair_type: PairType::Base,
                    percentage: None,
                    inverse_percentage: false,
                }),
                // Manually priced this run; nothing new to record.
                None if manual_overrides.contains_key(&key) => {}
                None if pair.tracked => output.skip(
                    pair,
                    TasaError::QuoteUnavailable {
                        pair: pair.pair_symbol(),
                        reason: "no quote this run".to_string(),
                    },
                ),
                None => output.skip(
                    pair,
                    TasaError::MissingDependency {
                        pair: pair.pair_symbol(),
                        missing: "manual rate".to_string(),
                    },
                ),
            }
        }
    }

    /// Derived pairs in dependency order. A pair whose chain cycles is
    /// skipped; the rest still run.
    fn derive_derived(&self, graph: &PairGraph, output: &mut DerivationOutput) {
        let ids: Vec<PairId> = graph.list_derived_pairs().iter().map(|p| p.id).collect();
        let order = match graph.topological_order(&ids) {
            Ok(order) => order,
            Err(_) => {
                let mut acyclic = Vec::new();
                for id in ids {
                    match graph.topological_order(&[id]) {
                        Ok(_) => acyclic.push(id),
                        Err(e) => {
                            if let Some(pair) = graph.get(id) {
                                output.skip(pair, e);
                            }
                        }
                    }
                }
                match graph.topological_order(&acyclic) {
                    Ok(order) => order,
                    Err(e) => {
                        for id in acyclic {
                            if let Some(pair) = graph.get(id) {
                                output.skip(pair, e.clone());
                            }
                        }
                        return;
                    }
                }
            }
        };

        let mut derived: BTreeMap<PairKey, Decimal> = BTreeMap::new();
        for id in order {
            let Some(pair) = graph.get(id) else {
                continue;
            };

            let base = match graph.validate(pair).and_then(|_| graph.resolve_base(pair)) {
                Ok(base) => base,
                Err(e) => {
                    output.skip(pair, e);
                    continue;
                }
            };

            let base_key = base.key();
            let Some(rate) = output
                .effective
                .get(&base_key)
                .or_else(|| derived.get(&base_key))
                .copied()
            else {
                output.skip(
                    pair,
                    TasaError::MissingDependency {
                        pair: pair.pair_symbol(),
                        missing: base_key.symbol(),
                    },
                );
                continue;
            };

            if let Some(value) = self.adjust(pair, rate, output) {
                derived.insert(pair.key(), value);
                output.push(CandidateRate {
                    key: pair.key(),
                    value,
                    source: RateSource::QuoteDerived,
                    pair_type: PairType::Derived,
                    percentage: pair.margin.percentage,
                    inverse_percentage: pair.margin.inverse,
                });
            }
        }
    }

    /// Cross pairs use only exact legs from the effective rates; an inverted
    /// leg is never substituted.
    fn derive_cross(&self, graph: &PairGraph, output: &mut DerivationOutput) {
        for pair in graph.list_cross_pairs() {
            if let Err(e) = graph.validate(pair) {
                output.skip(pair, e);
                continue;
            }

            let outbound = PairKey::new(pair.from.clone(), self.bridge.clone());
            let inbound = PairKey::new(self.bridge.clone(), pair.to.clone());

            let legs = (
                output.effective.get(&outbound).copied(),
                output.effective.get(&inbound).copied(),
            );
            let (from_leg, to_leg) = match legs {
                (Some(a), Some(b)) => (a, b),
                (None, _) => {
                    output.skip(pair, missing_leg(pair, &outbound));
                    continue;
                }
                (_, None) => {
                    output.skip(pair, missing_leg(pair, &inbound));
                    continue;
                }
            };

            let Some(bridged) = from_leg.checked_div(to_leg) else {
                output.discard(pair, format!("cannot divide {} by {}", from_leg, to_leg));
                continue;
            };

            if let Some(value) = self.adjust(pair, bridged, output) {
                output.push(CandidateRate {
                    key: pair.key(),
                    value,
                    source: RateSource::QuoteCross,
                    pair_type: PairType::Cross,
                    percentage: pair.margin.percentage,
                    inverse_percentage: pair.margin.inverse,
                });
            }
        }
    }

    /// Apply the pair's margin; `None` when the result is unusable.
    fn adjust(&self, pair: &CurrencyPair, rate: Decimal, output: &mut DerivationOutput) -> Option<Decimal> {
        match apply_margin(&pair.margin, rate) {
            Ok(value) => Some(value),
            Err(reason) => {
                output.discard(pair, reason);
                None
            }
        }
    }
}

fn missing_leg(pair: &CurrencyPair, leg: &PairKey) -> TasaError {
    TasaError::MissingDependency {
        pair: pair.pair_symbol(),
        missing: leg.symbol(),
    }
}

/// Margin-adjusted rate, which must be strictly positive.
pub fn apply_margin(margin: &Margin, rate: Decimal) -> std::result::Result<Decimal, String> {
    let value = margin
        .apply(rate)
        .ok_or_else(|| format!("overflow applying {} to {}", margin, rate))?;

    if value <= Decimal::ZERO {
        return Err(format!("non-positive result {}", value));
    }
    Ok(value.normalize())
}
