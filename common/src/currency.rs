//! Currencies and the currency registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TasaError};

/// Minimum length of a currency symbol.
pub const MIN_SYMBOL_LEN: usize = 2;
/// Maximum length of a currency symbol.
pub const MAX_SYMBOL_LEN: usize = 10;

/// Upper-case currency symbol such as `VES`, `USDT` or `ZELLE`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencySymbol(String);

impl CurrencySymbol {
    /// Parse and normalise a symbol.
    pub fn parse(raw: &str) -> Result<Self> {
        let symbol = raw.trim().to_uppercase();

        if symbol.len() < MIN_SYMBOL_LEN || symbol.len() > MAX_SYMBOL_LEN {
            return Err(TasaError::InvalidCurrency(format!(
                "symbol '{}' must be {}-{} characters",
                raw, MIN_SYMBOL_LEN, MAX_SYMBOL_LEN
            )));
        }

        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TasaError::InvalidCurrency(format!(
                "symbol '{}' must be alphanumeric",
                raw
            )));
        }

        Ok(Self(symbol))
    }

    /// Get the symbol as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CurrencySymbol {
    type Err = TasaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencySymbol {
    type Error = TasaError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CurrencySymbol> for String {
    fn from(symbol: CurrencySymbol) -> Self {
        symbol.0
    }
}

/// Kind of asset a currency represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
    Commodity,
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CurrencyKind::Fiat => "FIAT",
            CurrencyKind::Crypto => "CRYPTO",
            CurrencyKind::Commodity => "COMMODITY",
        };
        write!(f, "{}", name)
    }
}

/// A configured currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Unique symbol.
    pub symbol: CurrencySymbol,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Asset kind.
    pub kind: CurrencyKind,
}

impl Currency {
    /// Create a new currency.
    pub fn new(symbol: CurrencySymbol, name: impl Into<String>, kind: CurrencyKind) -> Self {
        Self {
            symbol,
            name: name.into(),
            kind,
        }
    }

    pub fn is_fiat(&self) -> bool {
        self.kind == CurrencyKind::Fiat
    }

    pub fn is_crypto(&self) -> bool {
        self.kind == CurrencyKind::Crypto
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.kind)
    }
}

/// Catalog of known currencies, keyed by symbol.
///
/// The registry is read-only for the duration of a derivation run; runs work on
/// a cloned snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrencyRegistry {
    currencies: BTreeMap<CurrencySymbol, Currency>,
}

impl CurrencyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a currency. Symbols are unique.
    pub fn register(&mut self, currency: Currency) -> Result<()> {
        if self.currencies.contains_key(&currency.symbol) {
            return Err(TasaError::InvalidCurrency(format!(
                "currency {} already registered",
                currency.symbol
            )));
        }
        self.currencies.insert(currency.symbol.clone(), currency);
        Ok(())
    }

    /// Look up a currency by symbol.
    pub fn get(&self, symbol: &CurrencySymbol) -> Option<&Currency> {
        self.currencies.get(symbol)
    }

    /// Look up a currency, failing if it is not registered.
    pub fn require(&self, symbol: &CurrencySymbol) -> Result<&Currency> {
        self.get(symbol)
            .ok_or_else(|| TasaError::NotFound(format!("currency {}", symbol)))
    }

    /// Kind of a registered currency.
    pub fn kind_of(&self, symbol: &CurrencySymbol) -> Option<CurrencyKind> {
        self.get(symbol).map(|c| c.kind)
    }

    pub fn contains(&self, symbol: &CurrencySymbol) -> bool {
        self.currencies.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    /// Iterate currencies in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = &Currency> {
        self.currencies.values()
    }
}
