//! PostgreSQL rate store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use tasa_common::{
    CurrencySymbol, NewRate, PairKey, Rate, RateId, RateState, Result, RunId, TasaError, Timestamp,
};

use crate::store::{cleared_successor, manual_successor, RateStore};

const SELECT_COLUMNS: &str = "id, from_currency, to_currency, value, source, percentage, \
     inverse_percentage, is_manual, manual_value, automatic_value, active, observed_at, run_id";

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    from_currency: String,
    to_currency: String,
    value: Decimal,
    source: String,
    percentage: Option<Decimal>,
    inverse_percentage: bool,
    is_manual: bool,
    manual_value: Option<Decimal>,
    automatic_value: Option<Decimal>,
    active: bool,
    observed_at: Timestamp,
    run_id: Option<Uuid>,
}

impl RateRow {
    fn from_rate(rate: &Rate) -> Self {
        Self {
            id: *rate.id.as_uuid(),
            from_currency: rate.key.from.as_str().to_string(),
            to_currency: rate.key.to.as_str().to_string(),
            value: rate.value(),
            source: rate.source.clone(),
            percentage: rate.percentage,
            inverse_percentage: rate.inverse_percentage,
            is_manual: rate.is_manual(),
            manual_value: rate.manual_value(),
            automatic_value: rate.automatic_value(),
            active: rate.active,
            observed_at: rate.observed_at,
            run_id: rate.run_id.map(|r| *r.as_uuid()),
        }
    }

    fn into_rate(self) -> Result<Rate> {
        let key = PairKey::new(
            CurrencySymbol::parse(&self.from_currency)?,
            CurrencySymbol::parse(&self.to_currency)?,
        );
        let state = if self.is_manual {
            RateState::Manual {
                visible: self.manual_value.unwrap_or(self.value),
                shadow_automatic: self.automatic_value,
            }
        } else {
            RateState::Automatic { value: self.value }
        };

        Ok(Rate {
            id: RateId::from_uuid(self.id),
            key,
            state,
            source: self.source,
            percentage: self.percentage,
            inverse_percentage: self.inverse_percentage,
            active: self.active,
            observed_at: self.observed_at,
            run_id: self.run_id.map(RunId::from_uuid),
        })
    }
}

fn db_error(key: &PairKey, err: sqlx::Error) -> TasaError {
    TasaError::persistence(key.symbol(), err)
}

/// Rate store backed by a `rates` table.
///
/// A partial unique index keeps at most one active row per pair; supersedes
/// run in one transaction per pair.
#[derive(Debug, Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| TasaError::persistence("rates", e))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!("Connected to rate store database");
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not touched.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS rates (
                id UUID PRIMARY KEY,
                from_currency TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                value NUMERIC NOT NULL,
                source TEXT NOT NULL,
                percentage NUMERIC,
                inverse_percentage BOOLEAN NOT NULL DEFAULT FALSE,
                is_manual BOOLEAN NOT NULL DEFAULT FALSE,
                manual_value NUMERIC,
                automatic_value NUMERIC,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                observed_at TIMESTAMPTZ NOT NULL,
                run_id UUID
            )
            "#,
            "CREATE UNIQUE INDEX IF NOT EXISTS rates_one_active_per_pair \
             ON rates (from_currency, to_currency) WHERE active",
            "CREATE INDEX IF NOT EXISTS rates_history \
             ON rates (from_currency, to_currency, observed_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| TasaError::persistence("rates", e))?;
        }
        Ok(())
    }

    async fn begin(&self, key: &PairKey) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| db_error(key, e))
    }

    async fn lock_active(tx: &mut Transaction<'static, Postgres>, key: &PairKey) -> Result<Option<Rate>> {
        let sql = format!(
            "SELECT {} FROM rates WHERE from_currency = $1 AND to_currency = $2 AND active FOR UPDATE",
            SELECT_COLUMNS
        );
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(key.from.as_str())
            .bind(key.to.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| db_error(key, e))?;
        row.map(RateRow::into_rate).transpose()
    }

    async fn deactivate(tx: &mut Transaction<'static, Postgres>, key: &PairKey) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE rates SET active = FALSE WHERE from_currency = $1 AND to_currency = $2 AND active",
        )
        .bind(key.from.as_str())
        .bind(key.to.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error(key, e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert(tx: &mut Transaction<'static, Postgres>, rate: &Rate) -> Result<()> {
        let row = RateRow::from_rate(rate);
        sqlx::query(
            r#"
            INSERT INTO rates (id, from_currency, to_currency, value, source, percentage,
                inverse_percentage, is_manual, manual_value, automatic_value, active,
                observed_at, run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(row.id)
        .bind(row.from_currency)
        .bind(row.to_currency)
        .bind(row.value)
        .bind(row.source)
        .bind(row.percentage)
        .bind(row.inverse_percentage)
        .bind(row.is_manual)
        .bind(row.manual_value)
        .bind(row.automatic_value)
        .bind(row.active)
        .bind(row.observed_at)
        .bind(row.run_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error(&rate.key, e))?;
        Ok(())
    }

    async fn supersede(tx: &mut Transaction<'static, Postgres>, rate: NewRate) -> Result<Rate> {
        Self::deactivate(tx, &rate.key).await?;
        let rate = rate.into_rate();
        Self::insert(tx, &rate).await?;
        Ok(rate)
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn latest_active(&self, key: &PairKey) -> Result<Option<Rate>> {
        let sql = format!(
            "SELECT {} FROM rates WHERE from_currency = $1 AND to_currency = $2 AND active",
            SELECT_COLUMNS
        );
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(key.from.as_str())
            .bind(key.to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(key, e))?;
        row.map(RateRow::into_rate).transpose()
    }

    async fn latest_manual(&self, key: &PairKey) -> Result<Option<Decimal>> {
        Ok(self.latest_active(key).await?.and_then(|r| r.manual_value()))
    }

    async fn append_and_activate(&self, rate: NewRate) -> Result<Rate> {
        let key = rate.key.clone();
        let mut tx = self.begin(&key).await?;
        let rate = Self::supersede(&mut tx, rate).await?;
        tx.commit().await.map_err(|e| db_error(&key, e))?;
        Ok(rate)
    }

    async fn mark_inactive(&self, key: &PairKey) -> Result<bool> {
        let mut tx = self.begin(key).await?;
        let flipped = Self::deactivate(&mut tx, key).await?;
        tx.commit().await.map_err(|e| db_error(key, e))?;
        Ok(flipped)
    }

    async fn active_rates(&self) -> Result<Vec<Rate>> {
        let sql = format!(
            "SELECT {} FROM rates WHERE active ORDER BY from_currency, to_currency",
            SELECT_COLUMNS
        );
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TasaError::persistence("rates", e))?;
        rows.into_iter().map(RateRow::into_rate).collect()
    }

    async fn history(&self, key: &PairKey) -> Result<Vec<Rate>> {
        let sql = format!(
            "SELECT {} FROM rates WHERE from_currency = $1 AND to_currency = $2 \
             ORDER BY observed_at, id",
            SELECT_COLUMNS
        );
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .bind(key.from.as_str())
            .bind(key.to.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(key, e))?;
        rows.into_iter().map(RateRow::into_rate).collect()
    }

    async fn manual_overrides(&self) -> Result<BTreeMap<PairKey, Decimal>> {
        let sql = format!("SELECT {} FROM rates WHERE active AND is_manual", SELECT_COLUMNS);
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TasaError::persistence("rates", e))?;

        let mut overrides = BTreeMap::new();
        for row in rows {
            let rate = row.into_rate()?;
            if let Some(value) = rate.manual_value() {
                overrides.insert(rate.key, value);
            }
        }
        Ok(overrides)
    }

    async fn set_manual(&self, key: &PairKey, value: Decimal, now: Timestamp) -> Result<Rate> {
        let mut tx = self.begin(key).await?;
        let active = Self::lock_active(&mut tx, key).await?;
        let rate = Self::supersede(&mut tx, manual_successor(active.as_ref(), key, value, now)).await?;
        tx.commit().await.map_err(|e| db_error(key, e))?;

        info!(pair = %key, manual = %value, "Manual override set");
        Ok(rate)
    }

    async fn clear_manual(&self, key: &PairKey, now: Timestamp) -> Result<Option<Rate>> {
        let mut tx = self.begin(key).await?;
        let active = Self::lock_active(&mut tx, key)
            .await?
            .filter(|r| r.is_manual())
            .ok_or_else(|| TasaError::NotFound(format!("manual override for {}", key)))?;

        let restored = match cleared_successor(&active, now) {
            Some(successor) => Some(Self::supersede(&mut tx, successor).await?),
            None => {
                Self::deactivate(&mut tx, key).await?;
                None
            }
        };
        tx.commit().await.map_err(|e| db_error(key, e))?;

        info!(pair = %key, restored = restored.is_some(), "Manual override cleared");
        Ok(restored)
    }

    async fn prune_history(&self, cutoff: Timestamp) -> Result<usize> {
        let result = sqlx::query("DELETE FROM rates WHERE NOT active AND observed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| TasaError::persistence("rates", e))?;

        let pruned = result.rows_affected() as usize;
        if pruned > 0 {
            info!(pruned, "Pruned rate history");
        }
        Ok(pruned)
    }
}
