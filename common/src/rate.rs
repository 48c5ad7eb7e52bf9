//! Persisted rates, manual-override state and derivation candidates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identifiers::{RateId, RunId};
use crate::pair::{PairKey, PairType};
use crate::time::Timestamp;

/// Visible and shadow values of a rate.
///
/// A manual override pins the visible value while the automatically computed
/// value keeps moving underneath, so clearing the override restores the latest
/// automatic value instead of leaving the pair empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RateState {
    /// Value computed by the engine.
    Automatic { value: Decimal },
    /// Value pinned by an operator.
    Manual {
        visible: Decimal,
        shadow_automatic: Option<Decimal>,
    },
}

impl RateState {
    /// The value consumers see.
    pub fn value(&self) -> Decimal {
        match self {
            RateState::Automatic { value } => *value,
            RateState::Manual { visible, .. } => *visible,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, RateState::Manual { .. })
    }

    pub fn manual_value(&self) -> Option<Decimal> {
        match self {
            RateState::Automatic { .. } => None,
            RateState::Manual { visible, .. } => Some(*visible),
        }
    }

    /// Latest automatically computed value, if any.
    pub fn automatic_value(&self) -> Option<Decimal> {
        match self {
            RateState::Automatic { value } => Some(*value),
            RateState::Manual {
                shadow_automatic, ..
            } => *shadow_automatic,
        }
    }

    /// Pin a manual value, keeping the automatic value as shadow.
    pub fn set_manual(self, manual: Decimal) -> RateState {
        RateState::Manual {
            visible: manual,
            shadow_automatic: self.automatic_value(),
        }
    }

    /// Drop the manual value. `None` when there is no automatic value to fall
    /// back to.
    pub fn clear_manual(self) -> Option<RateState> {
        self.automatic_value()
            .map(|value| RateState::Automatic { value })
    }

    /// Record a freshly computed value. Manual states only move their shadow.
    pub fn with_automatic(self, value: Decimal) -> RateState {
        match self {
            RateState::Automatic { .. } => RateState::Automatic { value },
            RateState::Manual { visible, .. } => RateState::Manual {
                visible,
                shadow_automatic: Some(value),
            },
        }
    }
}

/// Where a rate value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Marketplace quote, passed through.
    Quote,
    /// Margin-adjusted from a base rate.
    QuoteDerived,
    /// Bridged through an intermediary asset.
    QuoteCross,
    /// Entered by an operator.
    Manual,
}

impl RateSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RateSource::Quote => "quote",
            RateSource::QuoteDerived => "quote_derived",
            RateSource::QuoteCross => "quote_cross",
            RateSource::Manual => "manual",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rate computed by one derivation run, not yet persisted.
///
/// Candidates carry no timestamp so that two runs over the same inputs
/// produce identical candidate sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRate {
    pub key: PairKey,
    pub value: Decimal,
    pub source: RateSource,
    pub pair_type: PairType,
    pub percentage: Option<Decimal>,
    pub inverse_percentage: bool,
}

impl fmt::Display for CandidateRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} ({})", self.key, self.value, self.source)
    }
}

/// A rate row about to be appended to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRate {
    pub key: PairKey,
    pub state: RateState,
    pub source: String,
    pub percentage: Option<Decimal>,
    pub inverse_percentage: bool,
    pub observed_at: Timestamp,
    pub run_id: Option<RunId>,
}

impl NewRate {
    /// Automatic row for a candidate.
    pub fn from_candidate(candidate: &CandidateRate, observed_at: Timestamp, run_id: RunId) -> Self {
        Self {
            key: candidate.key.clone(),
            state: RateState::Automatic {
                value: candidate.value,
            },
            source: candidate.source.as_str().to_string(),
            percentage: candidate.percentage,
            inverse_percentage: candidate.inverse_percentage,
            observed_at,
            run_id: Some(run_id),
        }
    }

    /// Replace the state, keeping everything else.
    pub fn with_state(mut self, state: RateState) -> Self {
        self.state = state;
        self
    }

    /// Materialise as the active row.
    pub fn into_rate(self) -> Rate {
        Rate {
            id: RateId::new(),
            key: self.key,
            state: self.state,
            source: self.source,
            percentage: self.percentage,
            inverse_percentage: self.inverse_percentage,
            active: true,
            observed_at: self.observed_at,
            run_id: self.run_id,
        }
    }
}

/// An immutable rate observation in the history of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub id: RateId,
    pub key: PairKey,
    pub state: RateState,
    pub source: String,
    pub percentage: Option<Decimal>,
    pub inverse_percentage: bool,
    pub active: bool,
    pub observed_at: Timestamp,
    /// Run that produced the row; `None` for operator edits.
    pub run_id: Option<RunId>,
}

impl Rate {
    pub fn value(&self) -> Decimal {
        self.state.value()
    }

    pub fn is_manual(&self) -> bool {
        self.state.is_manual()
    }

    pub fn manual_value(&self) -> Option<Decimal> {
        self.state.manual_value()
    }

    pub fn automatic_value(&self) -> Option<Decimal> {
        self.state.automatic_value()
    }

    /// Start a successor row from this one with a new state.
    pub fn successor(&self, state: RateState, source: impl Into<String>, observed_at: Timestamp) -> NewRate {
        NewRate {
            key: self.key.clone(),
            state,
            source: source.into(),
            percentage: self.percentage,
            inverse_percentage: self.inverse_percentage,
            observed_at,
            run_id: None,
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value())?;
        if self.is_manual() {
            write!(f, " (manual)")?;
        }
        Ok(())
    }
}
