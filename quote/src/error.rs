//! Quote source error types.

use std::time::Duration;

use tasa_common::TasaError;
use thiserror::Error;

/// Errors returned by a quote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    /// Request could not be sent or the body could not be read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("Marketplace returned HTTP {0}")]
    Status(u16),

    /// Response envelope reported failure.
    #[error("Marketplace rejected the query: {0}")]
    Rejected(String),

    /// No advert with tradable quantity.
    #[error("No tradable adverts")]
    NoAdverts,

    /// Advert price could not be parsed.
    #[error("Unparseable price: {0}")]
    InvalidPrice(String),

    /// Price was zero or negative.
    #[error("Non-positive price: {0}")]
    NonPositive(String),

    /// Query exceeded the per-query timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Failure scripted by a test source.
    #[error("Scripted failure: {0}")]
    Scripted(String),
}

impl QuoteError {
    /// Check if a later run may succeed with the same query.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, QuoteError::InvalidPrice(_))
    }

    /// Per-pair engine error for this failure.
    pub fn into_tasa(self, pair: impl Into<String>) -> TasaError {
        TasaError::QuoteUnavailable {
            pair: pair.into(),
            reason: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for QuoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => QuoteError::Status(status.as_u16()),
            None => QuoteError::Transport(err.to_string()),
        }
    }
}

/// Result type for quote operations.
pub type QuoteResult<T> = Result<T, QuoteError>;
