//! Rate store contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use tasa_common::{NewRate, PairKey, Rate, RateSource, RateState, Result, Timestamp};

/// Source of rows that carry no automatic value.
pub const MANUAL_SOURCE: &str = RateSource::Manual.as_str();

/// Persistence contract for rate history.
///
/// Rows are never edited in place apart from the `active` flag. Every
/// operation is atomic per pair.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// The active row of a pair.
    async fn latest_active(&self, key: &PairKey) -> Result<Option<Rate>>;

    /// Manual value of the active row, if it is manual.
    async fn latest_manual(&self, key: &PairKey) -> Result<Option<Decimal>>;

    /// Append a row and make it the only active row of its pair.
    async fn append_and_activate(&self, rate: NewRate) -> Result<Rate>;

    /// Deactivate the active row of a pair. Returns whether one was active.
    async fn mark_inactive(&self, key: &PairKey) -> Result<bool>;

    /// Active rows of every pair.
    async fn active_rates(&self) -> Result<Vec<Rate>>;

    /// Every row of a pair, oldest first.
    async fn history(&self, key: &PairKey) -> Result<Vec<Rate>>;

    /// Manual values of every pair whose active row is manual.
    async fn manual_overrides(&self) -> Result<BTreeMap<PairKey, Decimal>>;

    /// Pin a manual value on a pair.
    async fn set_manual(&self, key: &PairKey, value: Decimal, now: Timestamp) -> Result<Rate>;

    /// Remove the manual value of a pair, restoring the latest automatic value.
    ///
    /// Returns `None` when there was no automatic value to restore; the pair
    /// is then left without an active rate.
    async fn clear_manual(&self, key: &PairKey, now: Timestamp) -> Result<Option<Rate>>;

    /// Delete inactive rows observed before `cutoff`. Active rows are kept.
    async fn prune_history(&self, cutoff: Timestamp) -> Result<usize>;
}

/// Row pinning `value` over the current active row, if any.
///
/// The row keeps the provenance of the automatic value it shadows.
pub fn manual_successor(active: Option<&Rate>, key: &PairKey, value: Decimal, now: Timestamp) -> NewRate {
    match active {
        Some(active) => active.successor(active.state.set_manual(value), active.source.clone(), now),
        None => NewRate {
            key: key.clone(),
            state: RateState::Manual {
                visible: value,
                shadow_automatic: None,
            },
            source: MANUAL_SOURCE.to_string(),
            percentage: None,
            inverse_percentage: false,
            observed_at: now,
            run_id: None,
        },
    }
}

/// Row restoring the shadowed automatic value of a manual row, or `None`
/// when there is none.
pub fn cleared_successor(active: &Rate, now: Timestamp) -> Option<NewRate> {
    active
        .state
        .clear_manual()
        .map(|state| active.successor(state, active.source.clone(), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_common::{now, CurrencySymbol};

    fn key() -> PairKey {
        PairKey::new(
            CurrencySymbol::parse("VES").unwrap(),
            CurrencySymbol::parse("USDT").unwrap(),
        )
    }

    #[test]
    fn test_manual_successor_without_history() {
        let row = manual_successor(None, &key(), dec!(42), now());
        assert_eq!(row.source, MANUAL_SOURCE);
        assert_eq!(row.state.manual_value(), Some(dec!(42)));
        assert_eq!(row.state.automatic_value(), None);
    }

    #[test]
    fn test_manual_successor_shadows_active() {
        let active = NewRate {
            key: key(),
            state: RateState::Automatic { value: dec!(40) },
            source: "quote".to_string(),
            percentage: None,
            inverse_percentage: false,
            observed_at: now(),
            run_id: None,
        }
        .into_rate();

        let row = manual_successor(Some(&active), &key(), dec!(42), now());
        assert_eq!(row.source, "quote");
        assert_eq!(row.state.value(), dec!(42));
        assert_eq!(row.state.automatic_value(), Some(dec!(40)));

        let restored = cleared_successor(&row.into_rate(), now()).unwrap();
        assert_eq!(restored.state, RateState::Automatic { value: dec!(40) });
    }
}
