//! In-memory rate store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use tracing::{debug, info};

use tasa_common::{NewRate, PairKey, Rate, Result, TasaError, Timestamp};

use crate::store::{cleared_successor, manual_successor, RateStore};

#[derive(Debug, Default)]
struct PairHistory {
    rows: Vec<Rate>,
}

impl PairHistory {
    fn active(&self) -> Option<&Rate> {
        self.rows.iter().rev().find(|r| r.active)
    }

    fn deactivate(&mut self) -> bool {
        let mut flipped = false;
        for row in self.rows.iter_mut().filter(|r| r.active) {
            row.active = false;
            flipped = true;
        }
        flipped
    }

    fn activate(&mut self, rate: NewRate) -> Rate {
        self.deactivate();
        let rate = rate.into_rate();
        self.rows.push(rate.clone());
        rate
    }
}

/// Rate store held in process memory.
///
/// Each pair's history sits behind its own map entry, so a supersede holds
/// that entry's lock for the deactivate-then-append step and readers of the
/// pair see either the old or the new active row.
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    histories: DashMap<PairKey, PairHistory>,
    failing: DashSet<PairKey>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all pairs.
    pub fn row_count(&self) -> usize {
        self.histories.iter().map(|h| h.rows.len()).sum()
    }

    fn check_writable(&self, key: &PairKey) -> Result<()> {
        if self.failing.contains(key) {
            return Err(TasaError::persistence(key.symbol(), "write rejected"));
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl InMemoryRateStore {
    /// Make every write to `key` fail until cleared.
    pub fn fail_writes_for(&self, key: PairKey) {
        self.failing.insert(key);
    }

    pub fn clear_write_failures(&self) {
        self.failing.clear();
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn latest_active(&self, key: &PairKey) -> Result<Option<Rate>> {
        Ok(self
            .histories
            .get(key)
            .and_then(|history| history.active().cloned()))
    }

    async fn latest_manual(&self, key: &PairKey) -> Result<Option<Decimal>> {
        Ok(self
            .histories
            .get(key)
            .and_then(|history| history.active().and_then(|r| r.manual_value())))
    }

    async fn append_and_activate(&self, rate: NewRate) -> Result<Rate> {
        self.check_writable(&rate.key)?;

        let mut history = self.histories.entry(rate.key.clone()).or_default();
        let rate = history.activate(rate);

        debug!(pair = %rate.key, value = %rate.value(), "Rate activated");
        Ok(rate)
    }

    async fn mark_inactive(&self, key: &PairKey) -> Result<bool> {
        self.check_writable(key)?;
        Ok(self
            .histories
            .get_mut(key)
            .map(|mut history| history.deactivate())
            .unwrap_or(false))
    }

    async fn active_rates(&self) -> Result<Vec<Rate>> {
        let mut rates: Vec<Rate> = self
            .histories
            .iter()
            .filter_map(|history| history.active().cloned())
            .collect();
        rates.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rates)
    }

    async fn history(&self, key: &PairKey) -> Result<Vec<Rate>> {
        Ok(self
            .histories
            .get(key)
            .map(|history| history.rows.clone())
            .unwrap_or_default())
    }

    async fn manual_overrides(&self) -> Result<BTreeMap<PairKey, Decimal>> {
        Ok(self
            .histories
            .iter()
            .filter_map(|history| {
                let active = history.active()?;
                active.manual_value().map(|v| (active.key.clone(), v))
            })
            .collect())
    }

    async fn set_manual(&self, key: &PairKey, value: Decimal, now: Timestamp) -> Result<Rate> {
        self.check_writable(key)?;

        let mut history = self.histories.entry(key.clone()).or_default();
        let successor = manual_successor(history.active(), key, value, now);
        let rate = history.activate(successor);

        info!(pair = %key, manual = %value, "Manual override set");
        Ok(rate)
    }

    async fn clear_manual(&self, key: &PairKey, now: Timestamp) -> Result<Option<Rate>> {
        self.check_writable(key)?;

        let mut history = self
            .histories
            .get_mut(key)
            .ok_or_else(|| TasaError::NotFound(format!("rate for {}", key)))?;

        let active = history
            .active()
            .filter(|r| r.is_manual())
            .cloned()
            .ok_or_else(|| TasaError::NotFound(format!("manual override for {}", key)))?;

        match cleared_successor(&active, now) {
            Some(successor) => {
                let rate = history.activate(successor);
                info!(pair = %key, value = %rate.value(), "Manual override cleared");
                Ok(Some(rate))
            }
            None => {
                history.deactivate();
                info!(pair = %key, "Manual override cleared; no automatic value to restore");
                Ok(None)
            }
        }
    }

    async fn prune_history(&self, cutoff: Timestamp) -> Result<usize> {
        let mut pruned = 0;
        for mut history in self.histories.iter_mut() {
            let before = history.rows.len();
            history.rows.retain(|r| r.active || r.observed_at >= cutoff);
            pruned += before - history.rows.len();
        }
        if pruned > 0 {
            info!(pruned, "Pruned rate history");
        }
        Ok(pruned)
    }
}
