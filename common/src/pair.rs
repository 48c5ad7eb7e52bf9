//! Currency pair configuration types and margin math.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::CurrencySymbol;
use crate::identifiers::PairId;

/// Ordered `(from, to)` tuple identifying a rate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub from: CurrencySymbol,
    pub to: CurrencySymbol,
}

impl PairKey {
    /// Create a new pair key.
    pub fn new(from: CurrencySymbol, to: CurrencySymbol) -> Self {
        Self { from, to }
    }

    /// Get the reverse key (`TO-FROM`).
    pub fn reverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Canonical `FROM-TO` symbol.
    pub fn symbol(&self) -> String {
        format!("{}-{}", self.from, self.to)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// How a pair obtains its rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairType {
    /// Rate comes directly from an external quote.
    Base,
    /// Rate is a base rate adjusted by a margin.
    Derived,
    /// Fiat-to-fiat rate bridged through an intermediary asset.
    Cross,
}

impl fmt::Display for PairType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairType::Base => "base",
            PairType::Derived => "derived",
            PairType::Cross => "cross",
        };
        write!(f, "{}", name)
    }
}

/// Trade direction of a marketplace query, seen from the fiat holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Spend fiat, obtain crypto (FIAT -> CRYPTO).
    Buy,
    /// Spend crypto, obtain fiat (CRYPTO -> FIAT).
    Sell,
}

impl Direction {
    /// Marketplace `tradeType` value.
    pub fn as_trade_type(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_trade_type())
    }
}

/// Key of one marketplace quote: `(fiat, crypto) x direction`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuoteKey {
    pub fiat: CurrencySymbol,
    pub crypto: CurrencySymbol,
    pub direction: Direction,
}

impl QuoteKey {
    pub fn new(fiat: CurrencySymbol, crypto: CurrencySymbol, direction: Direction) -> Self {
        Self {
            fiat,
            crypto,
            direction,
        }
    }

    /// The ordered pair this quote prices.
    pub fn pair_key(&self) -> PairKey {
        match self.direction {
            Direction::Buy => PairKey::new(self.fiat.clone(), self.crypto.clone()),
            Direction::Sell => PairKey::new(self.crypto.clone(), self.fiat.clone()),
        }
    }
}

impl fmt::Display for QuoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.fiat, self.crypto, self.direction)
    }
}

/// Percentage margin applied when deriving a rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
    /// Margin in percent, within `[0, 100]`. `None` passes the rate through.
    pub percentage: Option<Decimal>,
    /// Inflate (`true`) instead of deflate (`false`) the rate.
    #[serde(default)]
    pub inverse: bool,
}

impl Margin {
    /// No adjustment.
    pub fn none() -> Self {
        Self::default()
    }

    /// Margin taken off the top: `r * (1 - p/100)`.
    pub fn deflate(percentage: Decimal) -> Self {
        Self {
            percentage: Some(percentage),
            inverse: false,
        }
    }

    /// Premium added on top: `r * (1 + p/100)`.
    pub fn inflate(percentage: Decimal) -> Self {
        Self {
            percentage: Some(percentage),
            inverse: true,
        }
    }

    /// Whether the percentage lies within `[0, 100]` (or is unset).
    pub fn is_valid(&self) -> bool {
        match self.percentage {
            Some(p) => p >= Decimal::ZERO && p <= Decimal::ONE_HUNDRED,
            None => true,
        }
    }

    /// Apply the margin to a rate.
    ///
    /// Returns `None` on arithmetic overflow; the caller decides whether the
    /// result is usable (it may be zero for a 100% deflation).
    pub fn apply(&self, rate: Decimal) -> Option<Decimal> {
        let Some(percentage) = self.percentage else {
            return Some(rate);
        };

        let fraction = percentage.checked_div(Decimal::ONE_HUNDRED)?;
        let factor = if self.inverse {
            Decimal::ONE.checked_add(fraction)?
        } else {
            Decimal::ONE.checked_sub(fraction)?
        };

        rate.checked_mul(factor)
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percentage {
            Some(p) if self.inverse => write!(f, "+{}%", p),
            Some(p) => write!(f, "-{}%", p),
            None => write!(f, "none"),
        }
    }
}

/// Desired configuration of a currency pair, before it is placed in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSpec {
    pub from: CurrencySymbol,
    pub to: CurrencySymbol,
    pub pair_type: PairType,
    /// Base pair for `Derived` pairs.
    pub base_pair_ref: Option<PairId>,
    pub margin: Margin,
    /// Quote must be fetched from the marketplace.
    pub tracked: bool,
    /// Payment-method identifiers used to filter marketplace adverts.
    pub filter_set: Vec<String>,
    /// Transaction amount, in fiat, used to probe the marketplace.
    pub probe_amount: Option<Decimal>,
    /// Pair is priced by operator overrides.
    pub manual_rates: bool,
    pub active: bool,
    pub monitored: bool,
    pub description: Option<String>,
}

impl PairSpec {
    fn with_type(from: CurrencySymbol, to: CurrencySymbol, pair_type: PairType) -> Self {
        Self {
            from,
            to,
            pair_type,
            base_pair_ref: None,
            margin: Margin::none(),
            tracked: false,
            filter_set: Vec::new(),
            probe_amount: None,
            manual_rates: false,
            active: true,
            monitored: true,
            description: None,
        }
    }

    /// A base pair.
    pub fn base(from: CurrencySymbol, to: CurrencySymbol) -> Self {
        Self::with_type(from, to, PairType::Base)
    }

    /// A pair derived from `base`.
    pub fn derived(from: CurrencySymbol, to: CurrencySymbol, base: PairId) -> Self {
        let mut spec = Self::with_type(from, to, PairType::Derived);
        spec.base_pair_ref = Some(base);
        spec
    }

    /// A cross pair.
    pub fn cross(from: CurrencySymbol, to: CurrencySymbol) -> Self {
        Self::with_type(from, to, PairType::Cross)
    }

    /// Track the pair on the marketplace.
    pub fn tracked(mut self, filter_set: Vec<String>, probe_amount: Decimal) -> Self {
        self.tracked = true;
        self.filter_set = filter_set;
        self.probe_amount = Some(probe_amount);
        self
    }

    pub fn with_margin(mut self, margin: Margin) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_manual_rates(mut self) -> Self {
        self.manual_rates = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn unmonitored(mut self) -> Self {
        self.monitored = false;
        self
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.from.clone(), self.to.clone())
    }
}

/// A currency pair placed in the configuration graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub id: PairId,
    pub from: CurrencySymbol,
    pub to: CurrencySymbol,
    pub pair_type: PairType,
    pub base_pair_ref: Option<PairId>,
    pub margin: Margin,
    pub tracked: bool,
    pub filter_set: Vec<String>,
    pub probe_amount: Option<Decimal>,
    pub manual_rates: bool,
    pub active: bool,
    pub monitored: bool,
    pub description: Option<String>,
}

impl CurrencyPair {
    /// Materialise a spec under the given ID.
    pub fn from_spec(id: PairId, spec: PairSpec) -> Self {
        Self {
            id,
            from: spec.from,
            to: spec.to,
            pair_type: spec.pair_type,
            base_pair_ref: spec.base_pair_ref,
            margin: spec.margin,
            tracked: spec.tracked,
            filter_set: spec.filter_set,
            probe_amount: spec.probe_amount,
            manual_rates: spec.manual_rates,
            active: spec.active,
            monitored: spec.monitored,
            description: spec.description,
        }
    }

    /// Convert back to a spec, e.g. to edit and re-validate.
    pub fn to_spec(&self) -> PairSpec {
        PairSpec {
            from: self.from.clone(),
            to: self.to.clone(),
            pair_type: self.pair_type,
            base_pair_ref: self.base_pair_ref,
            margin: self.margin,
            tracked: self.tracked,
            filter_set: self.filter_set.clone(),
            probe_amount: self.probe_amount,
            manual_rates: self.manual_rates,
            active: self.active,
            monitored: self.monitored,
            description: self.description.clone(),
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.from.clone(), self.to.clone())
    }

    /// Canonical `FROM-TO` symbol.
    pub fn pair_symbol(&self) -> String {
        self.key().symbol()
    }

    /// Whether the pair takes part in a derivation run.
    pub fn is_runnable(&self) -> bool {
        self.active && self.monitored
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.pair_symbol(), self.pair_type)
    }
}
