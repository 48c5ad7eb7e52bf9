//! JSON seed file for the pair graph.
//!
//! Pairs name their base by `FROM-TO` symbol; the loader resolves symbols to
//! IDs and inserts pairs in dependency order, so the file may list them in any
//! order.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use tasa_common::{
    Currency, CurrencyPair, CurrencyRegistry, CurrencySymbol, Margin, PairId, PairKey, PairSpec,
    PairType, Result, TasaError,
};

use crate::graph::PairGraph;

fn default_true() -> bool {
    true
}

/// One pair entry of a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSeed {
    pub from: CurrencySymbol,
    pub to: CurrencySymbol,
    #[serde(rename = "type")]
    pub pair_type: PairType,
    /// `FROM-TO` symbol of the base pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub tracked: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_set: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_amount: Option<Decimal>,
    #[serde(default)]
    pub manual_rates: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub monitored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PairSeed {
    fn symbol(&self) -> String {
        format!("{}-{}", self.from, self.to)
    }

    fn into_spec(self, base_pair_ref: Option<PairId>) -> PairSpec {
        PairSpec {
            from: self.from,
            to: self.to,
            pair_type: self.pair_type,
            base_pair_ref,
            margin: Margin {
                percentage: self.percentage,
                inverse: self.inverse,
            },
            tracked: self.tracked,
            filter_set: self.filter_set,
            probe_amount: self.probe_amount,
            manual_rates: self.manual_rates,
            active: self.active,
            monitored: self.monitored,
            description: self.description,
        }
    }

    fn from_pair(pair: &CurrencyPair, base: Option<String>) -> Self {
        Self {
            from: pair.from.clone(),
            to: pair.to.clone(),
            pair_type: pair.pair_type,
            base,
            percentage: pair.margin.percentage,
            inverse: pair.margin.inverse,
            tracked: pair.tracked,
            filter_set: pair.filter_set.clone(),
            probe_amount: pair.probe_amount,
            manual_rates: pair.manual_rates,
            active: pair.active,
            monitored: pair.monitored,
            description: pair.description.clone(),
        }
    }
}

/// Currencies seed entry.
pub type CurrencySeed = Currency;

/// Seed file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairsFile {
    pub currencies: Vec<CurrencySeed>,
    pub pairs: Vec<PairSeed>,
}

impl PairsFile {
    /// Parse a seed from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TasaError::config("pairs file", e.to_string()))
    }

    /// Read and parse a seed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TasaError::config(path.display().to_string(), e.to_string()))?;
        Self::from_json(&json)
    }
}

/// Parse a `FROM-TO` pair symbol.
pub fn parse_pair_symbol(symbol: &str) -> Result<PairKey> {
    let (from, to) = symbol
        .split_once('-')
        .ok_or_else(|| TasaError::config(symbol, "expected FROM-TO"))?;
    Ok(PairKey::new(CurrencySymbol::parse(from)?, CurrencySymbol::parse(to)?))
}

impl PairGraph {
    /// Build a graph from a seed file.
    pub fn from_seed(seed: PairsFile) -> Result<Self> {
        let mut graph = PairGraph::new(CurrencyRegistry::new());
        for currency in seed.currencies {
            graph.register_currency(currency)?;
        }

        let mut pending = seed.pairs;
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();

            for entry in pending {
                let base = match &entry.base {
                    None => None,
                    Some(symbol) => {
                        let key = parse_pair_symbol(symbol)?;
                        match graph.get_by_key(&key) {
                            Some(base) => Some(base.id),
                            None => {
                                deferred.push(entry);
                                continue;
                            }
                        }
                    }
                };
                graph.insert(entry.into_spec(base))?;
            }

            if deferred.len() == before {
                let unresolved: Vec<String> = deferred.iter().map(PairSeed::symbol).collect();
                return Err(TasaError::config(
                    unresolved.join(", "),
                    "base pairs missing from seed or referencing each other",
                ));
            }
            pending = deferred;
        }

        info!(
            currencies = graph.registry().len(),
            pairs = graph.len(),
            "Pair graph loaded from seed"
        );
        Ok(graph)
    }

    /// Export the graph as a seed, bases ahead of dependents.
    pub fn to_seed(&self) -> PairsFile {
        let currencies = self.registry().iter().cloned().collect();

        let mut pairs: Vec<&CurrencyPair> = self.iter().collect();
        pairs.sort_by_key(|p| (p.pair_type, p.id));

        let pairs = pairs
            .into_iter()
            .map(|pair| {
                let base = pair
                    .base_pair_ref
                    .and_then(|b| self.get(b))
                    .map(|b| b.pair_symbol());
                PairSeed::from_pair(pair, base)
            })
            .collect();

        PairsFile { currencies, pairs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SEED: &str = r#"{
        "currencies": [
            {"symbol": "VES", "name": "Bolivar", "kind": "FIAT"},
            {"symbol": "COP", "name": "Peso colombiano", "kind": "FIAT"},
            {"symbol": "ZELLE", "name": "Zelle", "kind": "FIAT"},
            {"symbol": "USDT", "name": "Tether", "kind": "CRYPTO"}
        ],
        "pairs": [
            {"from": "ZELLE", "to": "VES", "type": "derived", "base": "USDT-VES", "percentage": "9"},
            {"from": "USDT", "to": "VES", "type": "base", "tracked": true,
             "filter_set": ["BANK"], "probe_amount": "20000"},
            {"from": "VES", "to": "COP", "type": "cross", "percentage": "8"}
        ]
    }"#;

    #[test]
    fn test_seed_loads_out_of_order() {
        let graph = PairGraph::from_seed(PairsFile::from_json(SEED).unwrap()).unwrap();

        assert_eq!(graph.len(), 3);
        let derived = graph.list_derived_pairs();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].margin, Margin::deflate(dec!(9)));
        assert_eq!(graph.resolve_base(derived[0]).unwrap().pair_symbol(), "USDT-VES");
    }

    #[test]
    fn test_seed_missing_base() {
        let json = r#"{
            "currencies": [
                {"symbol": "VES", "kind": "FIAT"},
                {"symbol": "ZELLE", "kind": "FIAT"},
                {"symbol": "USDT", "kind": "CRYPTO"}
            ],
            "pairs": [
                {"from": "ZELLE", "to": "VES", "type": "derived", "base": "USDT-VES"}
            ]
        }"#;
        let err = PairGraph::from_seed(PairsFile::from_json(json).unwrap()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_seed_export_reloads() {
        let graph = PairGraph::from_seed(PairsFile::from_json(SEED).unwrap()).unwrap();
        let exported = graph.to_seed();

        assert_eq!(exported.pairs[0].pair_type, PairType::Base);
        let reloaded = PairGraph::from_seed(exported).unwrap();
        assert_eq!(reloaded.summary().len(), graph.summary().len());
    }

    #[test]
    fn test_parse_pair_symbol() {
        let key = parse_pair_symbol("ves-usdt").unwrap();
        assert_eq!(key.symbol(), "VES-USDT");
        assert!(parse_pair_symbol("VESUSDT").is_err());
    }
}
