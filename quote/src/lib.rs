//! Tasa Quote Sources
//!
//! Representative marketplace prices for `(fiat, crypto, direction)` queries.
//!
//! - [`QuoteSource`]: the collaborator contract
//! - [`P2pMarketClient`]: HTTP client for the P2P advert search endpoint,
//!   also used to check a tracked pair's filters at setup
//! - [`QuoteFetcher`]: concurrent, timeout-bounded fan-out over a source
//!
//! A failed query never fails a batch; it is recorded next to the successes
//! and the engine treats the pair as missing for that run.

pub mod error;
pub mod fetcher;
pub mod p2p;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{QuoteError, QuoteResult};
pub use fetcher::{QuoteBatch, QuoteFetcher};
pub use p2p::{P2pMarketClient, P2pMarketConfig, TrackingValidation};
pub use source::{QuoteRequest, QuoteSource};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::StaticQuoteSource;
