//! Simulation scenarios.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tasa_graph::PairsFile;

/// A simulation scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Bridge currency for cross pairs.
    #[serde(default = "default_bridge")]
    pub bridge: String,
    /// Inline pair graph seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<PairsFile>,
    /// Seed file, relative to the scenario file. Used when `pairs` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs_file: Option<PathBuf>,
    /// Opening marketplace prices keyed by `FROM-TO` pair symbol.
    #[serde(default)]
    pub quotes: BTreeMap<String, Decimal>,
    /// Scripted rounds, in order.
    #[serde(default)]
    pub rounds: Vec<Round>,
}

fn default_bridge() -> String {
    "USDT".to_string()
}

/// What changes before one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Price moves; later rounds keep them.
    #[serde(default)]
    pub quotes: BTreeMap<String, Decimal>,
    /// Pairs whose quote fails this round only.
    #[serde(default)]
    pub failures: Vec<String>,
    /// Manual rates to pin before the run.
    #[serde(default)]
    pub set_overrides: BTreeMap<String, Decimal>,
    /// Manual rates to remove before the run.
    #[serde(default)]
    pub clear_overrides: Vec<String>,
    /// Visible rates asserted after the run.
    #[serde(default)]
    pub expect: BTreeMap<String, Decimal>,
}

impl Scenario {
    /// Read a scenario file and resolve its pair seed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let mut scenario: Scenario = serde_json::from_str(&json)
            .with_context(|| format!("parsing scenario {}", path.display()))?;

        if scenario.pairs.is_none() {
            let seed = scenario
                .pairs_file
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("scenario {} has no pairs", scenario.name))?;
            let seed = path.parent().unwrap_or_else(|| Path::new(".")).join(seed);
            scenario.pairs = Some(PairsFile::load(seed)?);
        }
        Ok(scenario)
    }

    /// Script for round `index`; rounds past the script change nothing.
    pub fn round(&self, index: usize) -> Round {
        self.rounds.get(index).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_scenario() {
        let json = r#"{
            "name": "override",
            "pairs": {"currencies": [], "pairs": []},
            "quotes": {"VES-USDT": "40"},
            "rounds": [
                {"set_overrides": {"VES-USDT": "50"}, "expect": {"VES-USDT": "50"}},
                {"failures": ["USDT-COP"]}
            ]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();

        assert_eq!(scenario.bridge, "USDT");
        assert_eq!(scenario.quotes["VES-USDT"], dec!(40));
        assert_eq!(scenario.round(0).set_overrides["VES-USDT"], dec!(50));
        assert_eq!(scenario.round(1).failures, vec!["USDT-COP".to_string()]);
        assert_eq!(scenario.round(5), Round::default());
    }
}
