//! Concurrent quote fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use tasa_common::QuoteKey;

use crate::error::QuoteError;
use crate::source::{QuoteRequest, QuoteSource};

/// Settled results of one fan-out: every request ends up in exactly one map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteBatch {
    pub quotes: BTreeMap<QuoteKey, Decimal>,
    pub failures: BTreeMap<QuoteKey, QuoteError>,
}

impl QuoteBatch {
    pub fn attempted(&self) -> usize {
        self.quotes.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.quotes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Queries were issued and none succeeded.
    pub fn is_total_outage(&self) -> bool {
        self.attempted() > 0 && self.quotes.is_empty()
    }
}

/// Issues every query of a run concurrently, each bounded by a timeout.
pub struct QuoteFetcher {
    source: Arc<dyn QuoteSource>,
    timeout: Duration,
}

impl QuoteFetcher {
    pub fn new(source: Arc<dyn QuoteSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch all quotes. Returns once every query has settled.
    ///
    /// Duplicate keys are queried once; the first request for a key wins.
    #[instrument(skip(self, requests), fields(source = %self.source.name()))]
    pub async fn fetch_all(&self, requests: Vec<QuoteRequest>) -> QuoteBatch {
        let mut unique: BTreeMap<QuoteKey, QuoteRequest> = BTreeMap::new();
        for request in requests {
            unique.entry(request.key.clone()).or_insert(request);
        }

        let futures = unique.into_values().map(|request| {
            let source = Arc::clone(&self.source);
            let limit = self.timeout;
            async move {
                let result = match tokio::time::timeout(limit, source.fetch_quote(&request)).await {
                    Ok(Ok(price)) if price > Decimal::ZERO => Ok(price),
                    Ok(Ok(price)) => Err(QuoteError::NonPositive(price.to_string())),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(QuoteError::Timeout(limit)),
                };
                (request.key, result)
            }
        });

        let mut batch = QuoteBatch::default();
        for (key, result) in join_all(futures).await {
            match result {
                Ok(price) => {
                    batch.quotes.insert(key, price);
                }
                Err(error) => {
                    warn!(query = %key, error = %error, "Quote query failed");
                    batch.failures.insert(key, error);
                }
            }
        }

        info!(
            attempted = batch.attempted(),
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "Quote fan-out settled"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StaticQuoteSource;
    use rust_decimal_macros::dec;
    use tasa_common::{CurrencySymbol, Direction};

    fn key(fiat: &str, direction: Direction) -> QuoteKey {
        QuoteKey::new(
            CurrencySymbol::parse(fiat).unwrap(),
            CurrencySymbol::parse("USDT").unwrap(),
            direction,
        )
    }

    fn request(key: QuoteKey) -> QuoteRequest {
        QuoteRequest::new(key, vec!["BANK".to_string()], dec!(100))
    }

    #[tokio::test]
    async fn test_successes_and_failures_are_split() {
        let source = StaticQuoteSource::new();
        source.set_quote(key("VES", Direction::Buy), dec!(40));
        source.set_failure(key("COP", Direction::Sell), "no adverts");

        let fetcher = QuoteFetcher::new(Arc::new(source), Duration::from_secs(1));
        let batch = fetcher
            .fetch_all(vec![
                request(key("VES", Direction::Buy)),
                request(key("COP", Direction::Sell)),
            ])
            .await;

        assert_eq!(batch.quotes.get(&key("VES", Direction::Buy)), Some(&dec!(40)));
        assert!(batch.failures.contains_key(&key("COP", Direction::Sell)));
        assert!(!batch.is_total_outage());
    }

    #[tokio::test]
    async fn test_unscripted_query_fails() {
        let fetcher = QuoteFetcher::new(Arc::new(StaticQuoteSource::new()), Duration::from_secs(1));
        let batch = fetcher.fetch_all(vec![request(key("BRL", Direction::Buy))]).await;

        assert_eq!(batch.failed(), 1);
        assert!(batch.is_total_outage());
    }

    #[tokio::test]
    async fn test_non_positive_price_is_failure() {
        let source = StaticQuoteSource::new();
        source.set_quote(key("VES", Direction::Buy), dec!(0));

        let fetcher = QuoteFetcher::new(Arc::new(source), Duration::from_secs(1));
        let batch = fetcher.fetch_all(vec![request(key("VES", Direction::Buy))]).await;

        assert!(matches!(
            batch.failures.get(&key("VES", Direction::Buy)),
            Some(QuoteError::NonPositive(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_query_times_out() {
        let source = StaticQuoteSource::new().with_delay(Duration::from_millis(200));
        source.set_quote(key("VES", Direction::Buy), dec!(40));

        let fetcher = QuoteFetcher::new(Arc::new(source), Duration::from_millis(20));
        let batch = fetcher.fetch_all(vec![request(key("VES", Direction::Buy))]).await;

        assert!(matches!(
            batch.failures.get(&key("VES", Direction::Buy)),
            Some(QuoteError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_keys_queried_once() {
        let source = Arc::new(StaticQuoteSource::new());
        source.set_quote(key("VES", Direction::Buy), dec!(40));

        let fetcher = QuoteFetcher::new(source.clone(), Duration::from_secs(1));
        let batch = fetcher
            .fetch_all(vec![
                request(key("VES", Direction::Buy)),
                request(key("VES", Direction::Buy)),
            ])
            .await;

        assert_eq!(batch.attempted(), 1);
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_an_outage() {
        let fetcher = QuoteFetcher::new(Arc::new(StaticQuoteSource::new()), Duration::from_secs(1));
        let batch = fetcher.fetch_all(Vec::new()).await;
        assert!(!batch.is_total_outage());
    }
}
