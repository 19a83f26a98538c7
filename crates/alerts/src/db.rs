//! SQLite database for watched pairs, findings and runtime settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use divergence_core::{
    DivergenceFinding, FindingId, FindingStore, NewFinding, PairId, PairKey, PairRegistry,
    SettingValue, SettingsStore, StoreError, StoreResult, WatchedPair,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Pair already exists: {0}")]
    DuplicatePair(String),
    #[error("Finding not found: {0}")]
    FindingNotFound(FindingId),
    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DuplicatePair(symbol) => StoreError::DuplicatePair(symbol),
            DbError::FindingNotFound(id) => StoreError::FindingNotFound(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

type FindingRow = (
    i64,
    i64,
    i64,
    String,
    String,
    f64,
    f64,
    f64,
    i64,
    bool,
    String,
);

const FINDING_COLUMNS: &str = "id, pair_a_id, pair_b_id, pair_a_symbol, pair_b_symbol, \
     price_a, price_b, divergence_percent, detected_at, notified, description";

/// Database connection for the bot.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given URL and create the schema.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every connection to sqlite::memory: is a separate database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS currency_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                divergence_threshold REAL NOT NULL DEFAULT 5.0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // detected_at is unix milliseconds (UTC)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS divergences (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_a_id INTEGER NOT NULL REFERENCES currency_pairs(id),
                pair_b_id INTEGER NOT NULL REFERENCES currency_pairs(id),
                pair_a_symbol TEXT NOT NULL,
                pair_b_symbol TEXT NOT NULL,
                price_a REAL NOT NULL,
                price_b REAL NOT NULL,
                divergence_percent REAL NOT NULL,
                detected_at INTEGER NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_divergences_pairs
            ON divergences(pair_a_id, pair_b_id, detected_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_divergences_pending
            ON divergences(notified, detected_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT,
                value_int INTEGER,
                value_bool INTEGER,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Add a watched pair. New pairs are active.
    pub async fn add_pair(&self, symbol: &str, threshold: f64) -> Result<WatchedPair, DbError> {
        let result = sqlx::query(
            "INSERT INTO currency_pairs (symbol, is_active, divergence_threshold) VALUES (?, 1, ?)",
        )
        .bind(symbol)
        .bind(threshold)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(WatchedPair::new(done.last_insert_rowid(), symbol, threshold)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::DuplicatePair(symbol.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All pairs, active or not, in registry order.
    pub async fn list_pairs(&self) -> Result<Vec<WatchedPair>, DbError> {
        self.query_pairs(false).await
    }

    /// Toggle a pair's active flag. Returns false for unknown ids.
    pub async fn set_pair_active(&self, id: PairId, active: bool) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE currency_pairs SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// A single pair by id.
    pub async fn get_pair(&self, id: PairId) -> Result<Option<WatchedPair>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, bool, f64)>(
            "SELECT id, symbol, is_active, divergence_threshold FROM currency_pairs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, symbol, is_active, divergence_threshold)| WatchedPair {
            id,
            symbol: symbol.into(),
            is_active,
            divergence_threshold,
        }))
    }

    /// Change a pair's threshold (%). Returns false for unknown ids.
    pub async fn set_pair_threshold(&self, id: PairId, threshold: f64) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE currency_pairs SET divergence_threshold = ? WHERE id = ?")
            .bind(threshold)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_pairs(&self, active_only: bool) -> Result<Vec<WatchedPair>, DbError> {
        let sql = if active_only {
            "SELECT id, symbol, is_active, divergence_threshold FROM currency_pairs WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT id, symbol, is_active, divergence_threshold FROM currency_pairs ORDER BY id"
        };

        let rows = sqlx::query_as::<_, (i64, String, bool, f64)>(sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, symbol, is_active, divergence_threshold)| WatchedPair {
                id,
                symbol: symbol.into(),
                is_active,
                divergence_threshold,
            })
            .collect())
    }

    /// Raw setting row: (value, value_int, value_bool).
    async fn setting_row(
        &self,
        key: &str,
    ) -> Result<Option<(Option<String>, Option<i64>, Option<bool>)>, DbError> {
        Ok(sqlx::query_as::<_, (Option<String>, Option<i64>, Option<bool>)>(
            "SELECT value, value_int, value_bool FROM bot_settings WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Get a finding by id.
    pub async fn get_finding(&self, id: FindingId) -> Result<DivergenceFinding, DbError> {
        let sql = format!("SELECT {FINDING_COLUMNS} FROM divergences WHERE id = ?");
        let row = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::FindingNotFound(id))?;
        finding_from_row(row)
    }
}

fn finding_from_row(row: FindingRow) -> Result<DivergenceFinding, DbError> {
    let (
        id,
        pair_a_id,
        pair_b_id,
        pair_a_symbol,
        pair_b_symbol,
        price_a,
        price_b,
        divergence_percent,
        detected_at_ms,
        notified,
        description,
    ) = row;

    let detected_at = DateTime::<Utc>::from_timestamp_millis(detected_at_ms)
        .ok_or(DbError::InvalidTimestamp(detected_at_ms))?;

    Ok(DivergenceFinding {
        id,
        pair_a_id,
        pair_b_id,
        pair_a_symbol: pair_a_symbol.into(),
        pair_b_symbol: pair_b_symbol.into(),
        price_a,
        price_b,
        divergence_percent,
        detected_at,
        notified,
        description,
    })
}

#[async_trait]
impl PairRegistry for Database {
    async fn list_active(&self) -> StoreResult<Vec<WatchedPair>> {
        Ok(self.query_pairs(true).await?)
    }
}

#[async_trait]
impl SettingsStore for Database {
    async fn get_int(&self, key: &str, default: i64) -> StoreResult<i64> {
        Ok(match self.setting_row(key).await? {
            Some((_, Some(n), _)) => n,
            Some((Some(text), None, _)) => text.trim().parse().unwrap_or(default),
            _ => default,
        })
    }

    async fn get_bool(&self, key: &str, default: bool) -> StoreResult<bool> {
        Ok(match self.setting_row(key).await? {
            Some((_, _, Some(b))) => b,
            Some((Some(text), _, None)) => match SettingValue::parse(&text) {
                SettingValue::Bool(b) => b,
                _ => default,
            },
            _ => default,
        })
    }

    async fn get_string(&self, key: &str, default: &str) -> StoreResult<String> {
        Ok(match self.setting_row(key).await? {
            Some((Some(text), _, _)) if !text.is_empty() => text,
            Some((_, Some(n), _)) => n.to_string(),
            Some((_, _, Some(b))) => b.to_string(),
            _ => default.to_string(),
        })
    }

    async fn set(&self, key: &str, value: SettingValue) -> StoreResult<()> {
        let (text, int, flag) = match value {
            SettingValue::Int(n) => (n.to_string(), Some(n), None),
            SettingValue::Bool(b) => (b.to_string(), None, Some(b)),
            SettingValue::Text(s) => (s, None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO bot_settings (key, value, value_int, value_bool)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                value_int = excluded.value_int,
                value_bool = excluded.value_bool,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(text)
        .bind(int)
        .bind(flag)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        debug!(key = key, "Setting updated");
        Ok(())
    }
}

#[async_trait]
impl FindingStore for Database {
    async fn record_finding(&self, mut finding: NewFinding) -> StoreResult<DivergenceFinding> {
        // Stored at millisecond precision; return what a read-back would give
        let detected_at_ms = finding.detected_at.timestamp_millis();
        finding.detected_at = DateTime::<Utc>::from_timestamp_millis(detected_at_ms)
            .ok_or(DbError::InvalidTimestamp(detected_at_ms))?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let result = sqlx::query(
            r#"
            INSERT INTO divergences
                (pair_a_id, pair_b_id, pair_a_symbol, pair_b_symbol, price_a, price_b,
                 divergence_percent, detected_at, notified, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(finding.pair_a_id)
        .bind(finding.pair_b_id)
        .bind(finding.pair_a_symbol.as_str())
        .bind(finding.pair_b_symbol.as_str())
        .bind(finding.price_a)
        .bind(finding.price_b)
        .bind(finding.divergence_percent)
        .bind(detected_at_ms)
        .bind(&finding.description)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(finding.into_finding(result.last_insert_rowid()))
    }

    async fn mark_notified(&self, id: FindingId) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE divergences SET notified = 1 WHERE id = ? AND notified = 0")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Either already notified or missing
        self.get_finding(id).await?;
        Ok(false)
    }

    async fn has_finding_since(&self, key: PairKey, since: DateTime<Utc>) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM divergences
            WHERE ((pair_a_id = ? AND pair_b_id = ?) OR (pair_a_id = ? AND pair_b_id = ?))
              AND detected_at >= ?
            "#,
        )
        .bind(key.low())
        .bind(key.high())
        .bind(key.high())
        .bind(key.low())
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(count > 0)
    }

    async fn pending_findings(&self) -> StoreResult<Vec<DivergenceFinding>> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM divergences WHERE notified = 0 ORDER BY detected_at, id"
        );
        let rows = sqlx::query_as::<_, FindingRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(finding_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn purge_notified_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM divergences WHERE notified = 1 AND detected_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        Ok(result.rows_affected())
    }
}
