//! Pair configuration graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tasa_common::{
    Currency, CurrencyKind, CurrencyPair, CurrencyRegistry, Direction, PairId, PairKey, PairSpec,
    PairType, QuoteKey, Result, TasaError,
};

/// Administrative view of one configured pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSummary {
    pub id: PairId,
    pub symbol: String,
    pub pair_type: PairType,
    /// Symbol of the base pair, for derived pairs.
    pub base: Option<String>,
    pub margin: String,
    pub tracked: bool,
    pub manual_rates: bool,
    pub active: bool,
    pub monitored: bool,
}

/// Configured currency pairs and the currencies they reference.
///
/// Every mutation is validated before it is applied, so a graph that was only
/// ever changed through this API holds no cycles, no orphaned derivations and
/// no duplicate ordered tuples. Runs operate on a cloned snapshot.
#[derive(Debug, Clone)]
pub struct PairGraph {
    registry: CurrencyRegistry,
    pairs: BTreeMap<PairId, CurrencyPair>,
    by_key: HashMap<PairKey, PairId>,
    next_id: PairId,
}

impl Default for PairGraph {
    fn default() -> Self {
        Self::new(CurrencyRegistry::default())
    }
}

impl PairGraph {
    /// Create an empty graph over a currency registry.
    pub fn new(registry: CurrencyRegistry) -> Self {
        Self {
            registry,
            pairs: BTreeMap::new(),
            by_key: HashMap::new(),
            next_id: PairId::new(1),
        }
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    /// Register a currency so pairs can reference it.
    pub fn register_currency(&mut self, currency: Currency) -> Result<()> {
        let symbol = currency.symbol.clone();
        let kind = currency.kind;
        self.registry.register(currency)?;
        info!(currency = %symbol, kind = %kind, "Currency registered");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, id: PairId) -> Option<&CurrencyPair> {
        self.pairs.get(&id)
    }

    /// Look up a pair, failing if it does not exist.
    pub fn require(&self, id: PairId) -> Result<&CurrencyPair> {
        self.pairs
            .get(&id)
            .ok_or_else(|| TasaError::NotFound(format!("pair {}", id)))
    }

    pub fn get_by_key(&self, key: &PairKey) -> Option<&CurrencyPair> {
        self.by_key.get(key).and_then(|id| self.pairs.get(id))
    }

    /// Iterate pairs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.pairs.values()
    }

    /// Add a pair.
    pub fn insert(&mut self, spec: PairSpec) -> Result<PairId> {
        self.check_spec(&spec, None)?;

        let id = self.next_id;
        self.next_id = id.next();

        let pair = CurrencyPair::from_spec(id, spec);
        info!(
            pair_id = %id,
            pair = %pair.pair_symbol(),
            pair_type = %pair.pair_type,
            "Pair configured"
        );

        self.by_key.insert(pair.key(), id);
        self.pairs.insert(id, pair);
        Ok(id)
    }

    /// Replace the configuration of an existing pair.
    ///
    /// A pair that other active pairs derive from must stay active and priced
    /// (tracked or manual).
    pub fn update(&mut self, id: PairId, spec: PairSpec) -> Result<()> {
        let current = self.require(id)?.clone();
        self.check_spec(&spec, Some(id))?;

        let still_eligible = spec.active && (spec.tracked || spec.manual_rates);
        if !still_eligible {
            let active_dependents: Vec<String> = self
                .dependents(id)
                .into_iter()
                .filter(|p| p.active)
                .map(|p| p.pair_symbol())
                .collect();
            if !active_dependents.is_empty() {
                return Err(TasaError::config(
                    current.pair_symbol(),
                    format!(
                        "pair is the base of {} and must stay active and priced",
                        active_dependents.join(", ")
                    ),
                ));
            }
        }

        let pair = CurrencyPair::from_spec(id, spec);
        if pair.key() != current.key() {
            self.by_key.remove(&current.key());
            self.by_key.insert(pair.key(), id);
        }

        info!(pair_id = %id, pair = %pair.pair_symbol(), "Pair updated");
        self.pairs.insert(id, pair);
        Ok(())
    }

    /// Delete a pair. Pairs referenced as a base cannot be deleted.
    pub fn remove(&mut self, id: PairId) -> Result<CurrencyPair> {
        let symbol = self.require(id)?.pair_symbol();

        let dependents: Vec<String> = self.dependents(id).iter().map(|p| p.pair_symbol()).collect();
        if !dependents.is_empty() {
            return Err(TasaError::config(
                symbol,
                format!("referenced as base by {}", dependents.join(", ")),
            ));
        }

        let pair = self
            .pairs
            .remove(&id)
            .ok_or_else(|| TasaError::NotFound(format!("pair {}", id)))?;
        self.by_key.remove(&pair.key());

        info!(pair_id = %id, pair = %symbol, "Pair removed");
        Ok(pair)
    }

    pub fn set_active(&mut self, id: PairId, active: bool) -> Result<()> {
        let mut spec = self.require(id)?.to_spec();
        spec.active = active;
        self.update(id, spec)
    }

    pub fn set_monitored(&mut self, id: PairId, monitored: bool) -> Result<()> {
        let mut spec = self.require(id)?.to_spec();
        spec.monitored = monitored;
        self.update(id, spec)
    }

    /// Start or stop tracking a pair on the marketplace. `None` stops tracking
    /// and clears the filter set and probe amount.
    pub fn set_tracked(&mut self, id: PairId, tracking: Option<(Vec<String>, Decimal)>) -> Result<()> {
        let mut spec = self.require(id)?.to_spec();
        match tracking {
            Some((filter_set, probe_amount)) => {
                spec = spec.tracked(filter_set, probe_amount);
            }
            None => {
                spec.tracked = false;
                spec.filter_set.clear();
                spec.probe_amount = None;
            }
        }
        self.update(id, spec)
    }

    /// Pairs that reference `id` as their base.
    pub fn dependents(&self, id: PairId) -> Vec<&CurrencyPair> {
        self.pairs
            .values()
            .filter(|p| p.base_pair_ref == Some(id))
            .collect()
    }

    /// Tracked pairs taking part in runs.
    pub fn list_tracked_pairs(&self) -> Vec<&CurrencyPair> {
        self.runnable().filter(|p| p.tracked).collect()
    }

    /// Base pairs taking part in runs, tracked or manually priced.
    pub fn list_base_pairs(&self) -> Vec<&CurrencyPair> {
        self.runnable()
            .filter(|p| p.pair_type == PairType::Base)
            .collect()
    }

    /// Derived pairs taking part in runs.
    pub fn list_derived_pairs(&self) -> Vec<&CurrencyPair> {
        self.runnable()
            .filter(|p| p.pair_type == PairType::Derived)
            .collect()
    }

    /// Cross pairs taking part in runs.
    pub fn list_cross_pairs(&self) -> Vec<&CurrencyPair> {
        self.runnable()
            .filter(|p| p.pair_type == PairType::Cross)
            .collect()
    }

    fn runnable(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.pairs.values().filter(|p| p.is_runnable())
    }

    /// Base pair of a derived pair.
    ///
    /// Fails when the reference is unset, dangling, inactive or points at a
    /// pair that is neither tracked nor manually priced.
    pub fn resolve_base(&self, pair: &CurrencyPair) -> Result<&CurrencyPair> {
        let symbol = pair.pair_symbol();

        if pair.pair_type != PairType::Derived {
            return Err(TasaError::config(
                symbol,
                format!("{} pairs have no base pair", pair.pair_type),
            ));
        }

        let base_id = pair
            .base_pair_ref
            .ok_or_else(|| TasaError::config(&symbol, "derived pair has no base pair"))?;
        let base = self
            .pairs
            .get(&base_id)
            .ok_or_else(|| TasaError::config(&symbol, format!("base pair {} does not exist", base_id)))?;

        Self::check_base_eligible(&symbol, base)?;
        Ok(base)
    }

    /// Order pairs for derivation: base pairs first, then derived pairs with
    /// every base ahead of its dependents, then cross pairs.
    ///
    /// Base references are followed even through pairs outside `ids`, so a
    /// cycle anywhere on a chain is reported.
    pub fn topological_order(&self, ids: &[PairId]) -> Result<Vec<PairId>> {
        let wanted: BTreeSet<PairId> = ids.iter().copied().collect();
        let mut order = Vec::with_capacity(wanted.len());

        let mut by_type: BTreeMap<PairType, Vec<PairId>> = BTreeMap::new();
        for id in &wanted {
            let pair = self.require(*id)?;
            by_type.entry(pair.pair_type).or_default().push(*id);
        }

        if let Some(base) = by_type.remove(&PairType::Base) {
            order.extend(base);
        }

        let mut done = BTreeSet::new();
        if let Some(derived) = by_type.remove(&PairType::Derived) {
            for id in derived {
                let mut stack = Vec::new();
                self.visit(id, &wanted, &mut done, &mut stack, &mut order)?;
            }
        }

        if let Some(cross) = by_type.remove(&PairType::Cross) {
            order.extend(cross);
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: PairId,
        wanted: &BTreeSet<PairId>,
        done: &mut BTreeSet<PairId>,
        stack: &mut Vec<PairId>,
        order: &mut Vec<PairId>,
    ) -> Result<()> {
        if done.contains(&id) {
            return Ok(());
        }

        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut path: Vec<String> = stack[pos..].iter().map(|s| self.symbol_of(*s)).collect();
            path.push(self.symbol_of(id));
            return Err(TasaError::CycleDetected(path));
        }

        let Some(pair) = self.pairs.get(&id) else {
            return Ok(());
        };

        stack.push(id);
        if pair.pair_type == PairType::Derived {
            if let Some(base) = pair.base_pair_ref {
                self.visit(base, wanted, done, stack, order)?;
            }
        }
        stack.pop();

        done.insert(id);
        if pair.pair_type == PairType::Derived && wanted.contains(&id) {
            order.push(id);
        }
        Ok(())
    }

    /// Re-check a placed pair against the current graph.
    pub fn validate(&self, pair: &CurrencyPair) -> Result<()> {
        self.check_spec(&pair.to_spec(), Some(pair.id))
    }

    /// Marketplace query key of a tracked pair: fiat to crypto is a buy,
    /// crypto to fiat is a sell.
    pub fn quote_key_for(&self, pair: &CurrencyPair) -> Result<QuoteKey> {
        let from = self.registry.kind_of(&pair.from);
        let to = self.registry.kind_of(&pair.to);

        match (from, to) {
            (Some(CurrencyKind::Fiat), Some(CurrencyKind::Crypto)) => Ok(QuoteKey::new(
                pair.from.clone(),
                pair.to.clone(),
                Direction::Buy,
            )),
            (Some(CurrencyKind::Crypto), Some(CurrencyKind::Fiat)) => Ok(QuoteKey::new(
                pair.to.clone(),
                pair.from.clone(),
                Direction::Sell,
            )),
            _ => Err(TasaError::config(
                pair.pair_symbol(),
                "tracked pairs must connect a fiat and a crypto currency",
            )),
        }
    }

    /// Per-pair rows for administrative visibility.
    pub fn summary(&self) -> Vec<PairSummary> {
        self.pairs
            .values()
            .map(|pair| PairSummary {
                id: pair.id,
                symbol: pair.pair_symbol(),
                pair_type: pair.pair_type,
                base: pair.base_pair_ref.map(|b| self.symbol_of(b)),
                margin: pair.margin.to_string(),
                tracked: pair.tracked,
                manual_rates: pair.manual_rates,
                active: pair.active,
                monitored: pair.monitored,
            })
            .collect()
    }

    fn symbol_of(&self, id: PairId) -> String {
        self.pairs
            .get(&id)
            .map(|p| p.pair_symbol())
            .unwrap_or_else(|| id.to_string())
    }

    fn check_spec(&self, spec: &PairSpec, id: Option<PairId>) -> Result<()> {
        let key = spec.key();
        let symbol = key.symbol();

        if spec.from == spec.to {
            return Err(TasaError::config(symbol, "from and to currencies must differ"));
        }

        for currency in [&spec.from, &spec.to] {
            if !self.registry.contains(currency) {
                return Err(TasaError::config(
                    symbol,
                    format!("unknown currency {}", currency),
                ));
            }
        }

        if let Some(existing) = self.by_key.get(&key) {
            if Some(*existing) != id {
                return Err(TasaError::config(
                    symbol,
                    format!("already configured as pair {}", existing),
                ));
            }
        }

        if !spec.margin.is_valid() {
            return Err(TasaError::config(
                symbol,
                format!("percentage {} outside [0, 100]", spec.margin),
            ));
        }

        if spec.tracked {
            self.check_tracking(&symbol, spec)?;
        }

        match spec.pair_type {
            PairType::Base => {
                if spec.base_pair_ref.is_some() {
                    return Err(TasaError::config(symbol, "base pairs must not reference a base"));
                }
                if !spec.tracked && !spec.manual_rates {
                    return Err(TasaError::config(
                        symbol,
                        "base pairs must be tracked or manually priced",
                    ));
                }
            }
            PairType::Derived => {
                let base_id = spec
                    .base_pair_ref
                    .ok_or_else(|| TasaError::config(&symbol, "derived pair has no base pair"))?;
                if spec.tracked {
                    return Err(TasaError::config(symbol, "only base pairs can be tracked"));
                }
                if Some(base_id) == id {
                    return Err(TasaError::CycleDetected(vec![symbol.clone(), symbol]));
                }
                let base = self.pairs.get(&base_id).ok_or_else(|| {
                    TasaError::config(&symbol, format!("base pair {} does not exist", base_id))
                })?;
                Self::check_base_eligible(&symbol, base)?;
                if let Some(id) = id {
                    self.check_acyclic(id, &symbol, base_id)?;
                }
            }
            PairType::Cross => {
                if spec.base_pair_ref.is_some() {
                    return Err(TasaError::config(
                        symbol,
                        "cross pairs are bridged and take no base pair",
                    ));
                }
                if spec.tracked {
                    return Err(TasaError::config(symbol, "only base pairs can be tracked"));
                }
                let both_fiat = [&spec.from, &spec.to]
                    .iter()
                    .all(|c| self.registry.kind_of(c) == Some(CurrencyKind::Fiat));
                if !both_fiat {
                    return Err(TasaError::config(symbol, "cross pairs must connect two fiat currencies"));
                }
            }
        }

        debug!(pair = %symbol, "Pair configuration valid");
        Ok(())
    }

    fn check_tracking(&self, symbol: &str, spec: &PairSpec) -> Result<()> {
        let from = self.registry.kind_of(&spec.from);
        let to = self.registry.kind_of(&spec.to);
        let fiat_crypto = matches!(
            (from, to),
            (Some(CurrencyKind::Fiat), Some(CurrencyKind::Crypto))
                | (Some(CurrencyKind::Crypto), Some(CurrencyKind::Fiat))
        );
        if !fiat_crypto {
            return Err(TasaError::config(
                symbol,
                "tracked pairs must connect a fiat and a crypto currency",
            ));
        }

        if spec.filter_set.is_empty() || spec.filter_set.iter().any(|f| f.trim().is_empty()) {
            return Err(TasaError::config(symbol, "tracked pairs need a non-empty filter set"));
        }

        match spec.probe_amount {
            Some(amount) if amount > Decimal::ZERO => Ok(()),
            _ => Err(TasaError::config(symbol, "tracked pairs need a positive probe amount")),
        }
    }

    fn check_base_eligible(symbol: &str, base: &CurrencyPair) -> Result<()> {
        if !base.active {
            return Err(TasaError::config(
                symbol,
                format!("base pair {} is inactive", base.pair_symbol()),
            ));
        }
        if !base.tracked && !base.manual_rates {
            return Err(TasaError::config(
                symbol,
                format!("base pair {} is neither tracked nor manually priced", base.pair_symbol()),
            ));
        }
        Ok(())
    }

    /// Walk the chain starting at `base_id`; reaching `id` again is a cycle.
    fn check_acyclic(&self, id: PairId, symbol: &str, base_id: PairId) -> Result<()> {
        let mut path = vec![symbol.to_string()];
        let mut seen = BTreeSet::from([id]);
        let mut current = Some(base_id);

        while let Some(cursor) = current {
            path.push(self.symbol_of(cursor));
            if !seen.insert(cursor) {
                return Err(TasaError::CycleDetected(path));
            }
            current = self.pairs.get(&cursor).and_then(|p| p.base_pair_ref);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tasa_common::{CurrencySymbol, Margin};

    fn sym(s: &str) -> CurrencySymbol {
        CurrencySymbol::parse(s).unwrap()
    }

    fn registry() -> CurrencyRegistry {
        let mut registry = CurrencyRegistry::new();
        for (s, kind) in [
            ("VES", CurrencyKind::Fiat),
            ("COP", CurrencyKind::Fiat),
            ("ZELLE", CurrencyKind::Fiat),
            ("USDT", CurrencyKind::Crypto),
            ("XAU", CurrencyKind::Commodity),
        ] {
            registry.register(Currency::new(sym(s), s, kind)).unwrap();
        }
        registry
    }

    fn tracked(from: &str, to: &str) -> PairSpec {
        PairSpec::base(sym(from), sym(to)).tracked(vec!["BANK".to_string()], dec!(20000))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut graph = PairGraph::new(registry());
        let id = graph.insert(tracked("VES", "USDT")).unwrap();

        let key = PairKey::new(sym("VES"), sym("USDT"));
        assert_eq!(graph.get_by_key(&key).map(|p| p.id), Some(id));
        assert_eq!(graph.list_tracked_pairs().len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused_after_remove() {
        let mut graph = PairGraph::new(registry());
        let first = graph.insert(tracked("VES", "USDT")).unwrap();
        assert_eq!(first, PairId::new(1));

        graph.remove(first).unwrap();
        let second = graph.insert(tracked("VES", "USDT")).unwrap();
        assert_eq!(second, first.next());
    }

    #[test]
    fn test_rejects_duplicate_tuple_and_self_pair() {
        let mut graph = PairGraph::new(registry());
        graph.insert(tracked("VES", "USDT")).unwrap();

        let dup = graph.insert(tracked("VES", "USDT"));
        assert!(matches!(dup, Err(TasaError::ConfigurationError { .. })));

        let same = graph.insert(PairSpec::base(sym("VES"), sym("VES")).with_manual_rates());
        assert!(matches!(same, Err(TasaError::ConfigurationError { .. })));
    }

    #[test]
    fn test_tracking_requirements() {
        let mut graph = PairGraph::new(registry());

        let fiat_fiat = PairSpec::base(sym("VES"), sym("COP")).tracked(vec!["BANK".into()], dec!(1));
        assert!(graph.insert(fiat_fiat).is_err());

        let no_filters = PairSpec::base(sym("VES"), sym("USDT")).tracked(vec![], dec!(1));
        assert!(graph.insert(no_filters).is_err());

        let zero_probe = PairSpec::base(sym("VES"), sym("USDT")).tracked(vec!["BANK".into()], dec!(0));
        assert!(graph.insert(zero_probe).is_err());
    }

    #[test]
    fn test_percentage_out_of_range() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();

        let spec = PairSpec::derived(sym("VES"), sym("ZELLE"), base)
            .with_margin(Margin::inflate(dec!(101)));
        assert!(matches!(
            graph.insert(spec),
            Err(TasaError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_derived_requires_eligible_base() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();
        let derived = graph
            .insert(PairSpec::derived(sym("VES"), sym("ZELLE"), base).with_margin(Margin::inflate(dec!(5))))
            .unwrap();

        // Derived pair without manual rates is not a valid base.
        let on_derived = graph.insert(PairSpec::derived(sym("ZELLE"), sym("VES"), derived));
        assert!(matches!(on_derived, Err(TasaError::ConfigurationError { .. })));

        let missing = graph.insert(PairSpec::derived(sym("COP"), sym("ZELLE"), PairId::new(99)));
        assert!(matches!(missing, Err(TasaError::ConfigurationError { .. })));
    }

    #[test]
    fn test_derived_on_inactive_derived_base_rejected() {
        let mut graph = PairGraph::new(registry());
        let root = graph.insert(tracked("VES", "USDT")).unwrap();
        let middle = graph
            .insert(
                PairSpec::derived(sym("VES"), sym("ZELLE"), root)
                    .with_manual_rates()
                    .inactive(),
            )
            .unwrap();

        let leaf = graph.insert(PairSpec::derived(sym("ZELLE"), sym("VES"), middle));
        assert!(matches!(leaf, Err(TasaError::ConfigurationError { .. })));
    }

    #[test]
    fn test_update_rejects_cycle() {
        let mut graph = PairGraph::new(registry());
        let root = graph.insert(tracked("VES", "USDT")).unwrap();
        let a = graph
            .insert(PairSpec::derived(sym("VES"), sym("ZELLE"), root).with_manual_rates())
            .unwrap();
        let b = graph
            .insert(PairSpec::derived(sym("ZELLE"), sym("VES"), a).with_manual_rates())
            .unwrap();

        let rewired = PairSpec::derived(sym("VES"), sym("ZELLE"), b).with_manual_rates();
        let err = graph.update(a, rewired).unwrap_err();
        assert!(matches!(err, TasaError::CycleDetected(_)));

        let self_ref = PairSpec::derived(sym("VES"), sym("ZELLE"), a).with_manual_rates();
        assert!(matches!(graph.update(a, self_ref), Err(TasaError::CycleDetected(_))));

        // Unchanged after rejected edits.
        assert_eq!(graph.require(a).unwrap().base_pair_ref, Some(root));
    }

    #[test]
    fn test_remove_referenced_pair_forbidden() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();
        let derived = graph.insert(PairSpec::derived(sym("VES"), sym("ZELLE"), base)).unwrap();

        assert!(graph.remove(base).is_err());
        assert!(graph.remove(derived).is_ok());
        assert!(graph.remove(base).is_ok());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_deactivating_referenced_base_rejected() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();
        let derived = graph.insert(PairSpec::derived(sym("VES"), sym("ZELLE"), base)).unwrap();

        assert!(graph.set_active(base, false).is_err());
        assert!(graph.set_tracked(base, None).is_err());

        graph.set_active(derived, false).unwrap();
        graph.set_active(base, false).unwrap();
        assert!(graph.list_tracked_pairs().is_empty());
    }

    #[test]
    fn test_cross_pair_rules() {
        let mut graph = PairGraph::new(registry());
        assert!(graph.insert(PairSpec::cross(sym("VES"), sym("COP"))).is_ok());
        assert!(graph.insert(PairSpec::cross(sym("VES"), sym("XAU"))).is_err());
    }

    #[test]
    fn test_resolve_base() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();
        let derived = graph.insert(PairSpec::derived(sym("VES"), sym("ZELLE"), base)).unwrap();

        let pair = graph.require(derived).unwrap().clone();
        assert_eq!(graph.resolve_base(&pair).unwrap().id, base);

        let base_pair = graph.require(base).unwrap().clone();
        assert!(graph.resolve_base(&base_pair).is_err());
    }

    #[test]
    fn test_topological_order_bases_first() {
        let mut graph = PairGraph::new(registry());
        let cross = graph.insert(PairSpec::cross(sym("VES"), sym("COP"))).unwrap();
        let root = graph.insert(tracked("VES", "USDT")).unwrap();
        let mid = graph
            .insert(PairSpec::derived(sym("VES"), sym("ZELLE"), root).with_manual_rates())
            .unwrap();
        let leaf = graph.insert(PairSpec::derived(sym("ZELLE"), sym("VES"), mid)).unwrap();

        let order = graph.topological_order(&[leaf, cross, mid, root]).unwrap();
        assert_eq!(order, vec![root, mid, leaf, cross]);
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let mut graph = PairGraph::new(registry());
        let root = graph.insert(tracked("VES", "USDT")).unwrap();
        let a = graph
            .insert(PairSpec::derived(sym("VES"), sym("ZELLE"), root).with_manual_rates())
            .unwrap();
        let b = graph
            .insert(PairSpec::derived(sym("ZELLE"), sym("VES"), a).with_manual_rates())
            .unwrap();

        // Corrupt the graph behind the validating API.
        if let Some(pair) = graph.pairs.get_mut(&a) {
            pair.base_pair_ref = Some(b);
        }

        let err = graph.topological_order(&[a, b]).unwrap_err();
        match err {
            TasaError::CycleDetected(path) => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_runnable_filter() {
        let mut graph = PairGraph::new(registry());
        let id = graph.insert(tracked("VES", "USDT")).unwrap();
        graph.insert(tracked("USDT", "COP").unmonitored()).unwrap();

        assert_eq!(graph.list_tracked_pairs().len(), 1);
        graph.set_monitored(id, false).unwrap();
        assert!(graph.list_tracked_pairs().is_empty());
    }

    #[test]
    fn test_quote_key_direction() {
        let mut graph = PairGraph::new(registry());
        let buy = graph.insert(tracked("VES", "USDT")).unwrap();
        let sell = graph.insert(tracked("USDT", "COP")).unwrap();

        let buy_key = graph.quote_key_for(graph.require(buy).unwrap()).unwrap();
        assert_eq!(buy_key.direction, Direction::Buy);
        assert_eq!(buy_key.fiat, sym("VES"));

        let sell_key = graph.quote_key_for(graph.require(sell).unwrap()).unwrap();
        assert_eq!(sell_key.direction, Direction::Sell);
        assert_eq!(sell_key.fiat, sym("COP"));
        assert_eq!(sell_key.pair_key(), PairKey::new(sym("USDT"), sym("COP")));
    }

    #[test]
    fn test_summary_names_base() {
        let mut graph = PairGraph::new(registry());
        let base = graph.insert(tracked("VES", "USDT")).unwrap();
        graph
            .insert(PairSpec::derived(sym("VES"), sym("ZELLE"), base).with_margin(Margin::inflate(dec!(5))))
            .unwrap();

        let summary = graph.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].base.as_deref(), Some("VES-USDT"));
        assert_eq!(summary[1].margin, "+5%");
    }
}
