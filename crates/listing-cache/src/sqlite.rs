//! SQLite-backed `Store`.
//!
//! Cache entries map onto columns. Analysis results and opportunities are
//! kept as one serialized JSON record per listing, next to the few columns
//! needed for filtering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listing_core::{
    AnalysisResult, CacheEntry, CacheFilter, CacheStatus, EngineError, Opportunity, Store,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS listing_cache (
        listing_id TEXT PRIMARY KEY,
        neighborhood TEXT NOT NULL,
        price REAL NOT NULL,
        first_seen_at TEXT NOT NULL,
        last_seen_at TEXT NOT NULL,
        last_analyzed_at TEXT,
        status TEXT NOT NULL,
        missed_fetches INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_listing_cache_neighborhood ON listing_cache(neighborhood)",
    "CREATE TABLE IF NOT EXISTS analysis_results (
        listing_id TEXT PRIMARY KEY,
        neighborhood TEXT NOT NULL,
        evaluated_at TEXT NOT NULL,
        discount_percent REAL NOT NULL,
        confidence INTEGER NOT NULL,
        is_undervalued INTEGER NOT NULL,
        record TEXT NOT NULL,
        invalidated_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS opportunities (
        listing_id TEXT PRIMARY KEY,
        neighborhood TEXT NOT NULL,
        status TEXT NOT NULL,
        record TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

fn store_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::StoreError(e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, EngineError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| EngineError::InvalidData(format!("timestamp '{}': {}", raw, e)))
}

#[derive(Debug, FromRow)]
struct CacheRow {
    listing_id: String,
    neighborhood: String,
    price: f64,
    first_seen_at: String,
    last_seen_at: String,
    last_analyzed_at: Option<String>,
    status: String,
    missed_fetches: i64,
}

impl CacheRow {
    fn into_entry(self) -> Result<CacheEntry, EngineError> {
        let status = CacheStatus::parse(&self.status).ok_or_else(|| {
            EngineError::InvalidData(format!(
                "unknown cache status '{}' for listing {}",
                self.status, self.listing_id
            ))
        })?;
        Ok(CacheEntry {
            first_seen_at: parse_time(&self.first_seen_at)?,
            last_seen_at: parse_time(&self.last_seen_at)?,
            last_analyzed_at: self.last_analyzed_at.as_deref().map(parse_time).transpose()?,
            listing_id: self.listing_id,
            neighborhood: self.neighborhood,
            price: self.price,
            status,
            missed_fetches: self.missed_fetches.max(0) as u32,
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and make
    /// sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(store_err)?
            .create_if_missing(true);

        // an in-memory database lives and dies with its single connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("SQLite store ready at {}", database_url);
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), EngineError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Currently published opportunities, best discount first
    pub async fn published_opportunities(&self) -> Result<Vec<Opportunity>, EngineError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT record FROM opportunities WHERE status = 'published' ORDER BY listing_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut found = rows
            .into_iter()
            .map(|(record,)| serde_json::from_str::<Opportunity>(&record).map_err(store_err))
            .collect::<Result<Vec<_>, _>>()?;
        found.sort_by(|a, b| {
            b.discount_percent
                .partial_cmp(&a.discount_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(found)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_entry(&self, entry: &CacheEntry) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO listing_cache
                (listing_id, neighborhood, price, first_seen_at, last_seen_at, last_analyzed_at, status, missed_fetches)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(listing_id) DO UPDATE SET
                neighborhood = excluded.neighborhood,
                price = excluded.price,
                last_seen_at = excluded.last_seen_at,
                last_analyzed_at = excluded.last_analyzed_at,
                status = excluded.status,
                missed_fetches = excluded.missed_fetches",
        )
        .bind(&entry.listing_id)
        .bind(&entry.neighborhood)
        .bind(entry.price)
        .bind(entry.first_seen_at.to_rfc3339())
        .bind(entry.last_seen_at.to_rfc3339())
        .bind(entry.last_analyzed_at.map(|t| t.to_rfc3339()))
        .bind(entry.status.as_str())
        .bind(entry.missed_fetches as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn upsert_result(&self, result: &AnalysisResult) -> Result<(), EngineError> {
        let record = serde_json::to_string(result).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO analysis_results
                (listing_id, neighborhood, evaluated_at, discount_percent, confidence, is_undervalued, record, invalidated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(listing_id) DO UPDATE SET
                neighborhood = excluded.neighborhood,
                evaluated_at = excluded.evaluated_at,
                discount_percent = excluded.discount_percent,
                confidence = excluded.confidence,
                is_undervalued = excluded.is_undervalued,
                record = excluded.record,
                invalidated_at = NULL",
        )
        .bind(&result.listing_id)
        .bind(&result.neighborhood)
        .bind(result.evaluated_at.to_rfc3339())
        .bind(result.discount_percent)
        .bind(result.confidence as i64)
        .bind(result.is_undervalued)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn invalidate_result(
        &self,
        listing_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "UPDATE analysis_results SET invalidated_at = ?
             WHERE listing_id = ? AND invalidated_at IS NULL",
        )
        .bind(at.to_rfc3339())
        .bind(listing_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn upsert_opportunity(&self, opportunity: &Opportunity) -> Result<(), EngineError> {
        let record = serde_json::to_string(opportunity).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO opportunities (listing_id, neighborhood, status, record, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(listing_id) DO UPDATE SET
                neighborhood = excluded.neighborhood,
                status = excluded.status,
                record = excluded.record,
                updated_at = excluded.updated_at",
        )
        .bind(&opportunity.listing_id)
        .bind(&opportunity.neighborhood)
        .bind(opportunity.status.as_str())
        .bind(record)
        .bind(opportunity.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn query_by_neighborhood(
        &self,
        neighborhood: &str,
        filter: CacheFilter,
    ) -> Result<Vec<CacheEntry>, EngineError> {
        let rows: Vec<CacheRow> = sqlx::query_as(
            "SELECT listing_id, neighborhood, price, first_seen_at, last_seen_at,
                    last_analyzed_at, status, missed_fetches
             FROM listing_cache
             WHERE neighborhood = ?
             ORDER BY listing_id",
        )
        .bind(neighborhood)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = row.into_entry()?;
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn latest_result(&self, listing_id: &str) -> Result<Option<AnalysisResult>, EngineError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT record FROM analysis_results WHERE listing_id = ? AND invalidated_at IS NULL",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(|(record,)| serde_json::from_str(&record).map_err(store_err))
            .transpose()
    }

    async fn opportunity(&self, listing_id: &str) -> Result<Option<Opportunity>, EngineError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM opportunities WHERE listing_id = ?")
                .bind(listing_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        row.map(|(record,)| serde_json::from_str(&record).map_err(store_err))
            .transpose()
    }
}
