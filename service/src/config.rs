//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use tasa_common::time::{constants, DurationExt};
use tasa_common::CurrencySymbol;
use tasa_quote::p2p::DEFAULT_MARKET_URL;
use tasa_quote::P2pMarketConfig;

/// Longest accepted history retention (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Advert search endpoint.
    pub url: String,
    /// Adverts requested per query.
    pub rows: u32,
    /// Per-query timeout.
    pub quote_timeout: Duration,
    /// Check tracked pairs' filters against the marketplace at startup.
    pub validate_tracking: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MARKET_URL.to_string(),
            rows: 20,
            quote_timeout: constants::default_quote_timeout().as_std(),
            validate_tracking: false,
        }
    }
}

impl MarketConfig {
    pub fn client_config(&self) -> P2pMarketConfig {
        P2pMarketConfig {
            url: self.url.clone(),
            rows: self.rows,
            timeout: self.quote_timeout,
        }
    }
}

/// Rate store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Postgres URL. Unset means the in-memory store.
    pub database_url: Option<String>,
    /// Pool size for the Postgres store.
    pub max_connections: u32,
    /// Inactive rows older than this are pruned after each run.
    pub history_retention: chrono::Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            history_retention: constants::default_history_retention(),
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time between scheduled runs.
    pub run_interval: Duration,
    /// Intermediary asset for cross pairs.
    pub bridge_currency: String,
    /// Pair seed file.
    pub pairs_file: PathBuf,
    pub market: MarketConfig,
    pub store: StoreConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            run_interval: constants::default_run_interval().as_std(),
            bridge_currency: "USDT".to_string(),
            pairs_file: PathBuf::from("config/pairs.json"),
            market: MarketConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparseable numbers leave the default in place.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = lookup("TASA_RUN_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.run_interval = Duration::from_secs(secs);
            }
        }

        if let Some(ms) = lookup("TASA_QUOTE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.market.quote_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(bridge) = lookup("TASA_BRIDGE_CURRENCY") {
            config.bridge_currency = bridge;
        }

        if let Some(path) = lookup("TASA_PAIRS_FILE") {
            config.pairs_file = PathBuf::from(path);
        }

        if let Some(url) = lookup("TASA_MARKET_URL") {
            config.market.url = url;
        }

        if let Some(rows) = lookup("TASA_MARKET_ROWS") {
            if let Ok(rows) = rows.parse() {
                config.market.rows = rows;
            }
        }

        if let Some(flag) = lookup("TASA_VALIDATE_TRACKING") {
            if let Ok(flag) = flag.parse() {
                config.market.validate_tracking = flag;
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            if !url.is_empty() {
                config.store.database_url = Some(url);
            }
        }

        if let Some(days) = lookup("TASA_HISTORY_RETENTION_DAYS") {
            if let Some(retention) = days.parse().ok().and_then(chrono::Duration::try_days) {
                config.store.history_retention = retention;
            }
        }

        config
    }

    /// Bridge currency as a validated symbol.
    pub fn bridge(&self) -> Result<CurrencySymbol, String> {
        CurrencySymbol::parse(&self.bridge_currency).map_err(|e| e.to_string())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.run_interval.is_zero() {
            return Err("Run interval cannot be 0".to_string());
        }

        if self.market.quote_timeout.is_zero() {
            return Err("Quote timeout cannot be 0".to_string());
        }

        if self.market.url.trim().is_empty() {
            return Err("Market URL cannot be empty".to_string());
        }

        if self.market.rows == 0 {
            return Err("Market rows cannot be 0".to_string());
        }

        if self.store.history_retention <= chrono::Duration::zero() {
            return Err("History retention must be positive".to_string());
        }

        if self.store.history_retention.num_days() > MAX_RETENTION_DAYS {
            return Err(format!("History retention cannot exceed {} days", MAX_RETENTION_DAYS));
        }

        self.bridge()?;
        Ok(())
    }
}
