//! Scripted quote source for tests and simulations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use tasa_common::QuoteKey;

use crate::error::{QuoteError, QuoteResult};
use crate::source::{QuoteRequest, QuoteSource};

/// Quote source answering from a script. Unscripted keys fail.
pub struct StaticQuoteSource {
    script: RwLock<HashMap<QuoteKey, Result<Decimal, String>>>,
    delay: Option<Duration>,
    calls: AtomicU64,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self {
            script: RwLock::new(HashMap::new()),
            delay: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Delay every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_quote(&self, key: QuoteKey, price: Decimal) {
        self.script.write().insert(key, Ok(price));
    }

    pub fn set_failure(&self, key: QuoteKey, reason: impl Into<String>) {
        self.script.write().insert(key, Err(reason.into()));
    }

    pub fn clear(&self, key: &QuoteKey) {
        self.script.write().remove(key);
    }

    /// Number of queries answered so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for StaticQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_quote(&self, request: &QuoteRequest) -> QuoteResult<Decimal> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.read().get(&request.key).cloned();
        match scripted {
            Some(Ok(price)) => Ok(price),
            Some(Err(reason)) => Err(QuoteError::Scripted(reason)),
            None => Err(QuoteError::Scripted(format!("no quote scripted for {}", request.key))),
        }
    }
}
