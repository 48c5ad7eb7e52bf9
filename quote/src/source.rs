//! Quote source contract.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use tasa_common::{PairKey, QuoteKey};

use crate::error::QuoteResult;

/// One marketplace query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub key: QuoteKey,
    /// Payment-method identifiers adverts must accept.
    pub filter_set: Vec<String>,
    /// Fiat amount adverts must be able to fill.
    pub probe_amount: Decimal,
}

impl QuoteRequest {
    pub fn new(key: QuoteKey, filter_set: Vec<String>, probe_amount: Decimal) -> Self {
        Self {
            key,
            filter_set,
            probe_amount,
        }
    }

    /// The ordered pair the quote prices.
    pub fn pair_key(&self) -> PairKey {
        self.key.pair_key()
    }
}

impl fmt::Display for QuoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] @ {}", self.key, self.filter_set.join(","), self.probe_amount)
    }
}

/// Producer of one representative price per query.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Source name, used in logs.
    fn name(&self) -> &str;

    /// Fetch the representative price for a query.
    async fn fetch_quote(&self, request: &QuoteRequest) -> QuoteResult<Decimal>;
}
