use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use crate::cache::store::CacheStore;
use crate::db::validate_table_name;
use crate::errors::CacheError;
use crate::models::cache::{CacheEntry, CacheKey, CacheStats, LookupTier};
use crate::models::company::CompanyId;

#[derive(Debug, FromRow)]
struct CacheRow {
    normalized_name: String,
    website: Option<String>,
    original_name: String,
    company_id: Option<i64>,
    lookup_tier: String,
    confidence: f64,
    metadata: Value,
    hit_count: i64,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    lookup_successful: bool,
}

impl TryFrom<CacheRow> for CacheEntry {
    type Error = CacheError;

    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            normalized_name: row.normalized_name,
            website_key: row.website,
            original_name: row.original_name,
            resolved_id: row.company_id.map(CompanyId),
            lookup_tier: row.lookup_tier.parse().map_err(CacheError::Malformed)?,
            confidence: row.confidence,
            metadata: row.metadata,
            hit_count: row.hit_count,
            created_at: row.created_at,
            last_accessed_at: row.last_accessed_at,
            lookup_successful: row.lookup_successful,
        })
    }
}

const COLUMNS: &str = "normalized_name, website, original_name, company_id, lookup_tier, \
    confidence, metadata, hit_count, created_at, last_accessed_at, lookup_successful";

/// Cache store talking to Postgres directly.
///
/// Upserts resolve conflicts in SQL, so the no-downgrade rule holds even
/// under concurrent writers.
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
    table: String,
}

impl PgCacheStore {
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    fn upsert_sql(&self, key: &CacheKey) -> String {
        let table = &self.table;
        let conflict = match key {
            CacheKey::Website(_) => "(website) WHERE website IS NOT NULL",
            CacheKey::Name(_) => "(normalized_name) WHERE website IS NULL",
        };
        format!(
            r#"
            INSERT INTO {table} AS t
                (normalized_name, website, original_name, company_id, lookup_tier,
                 confidence, metadata, hit_count, created_at, last_accessed_at, lookup_successful)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10)
            ON CONFLICT {conflict} DO UPDATE SET
                normalized_name   = EXCLUDED.normalized_name,
                original_name     = EXCLUDED.original_name,
                company_id        = EXCLUDED.company_id,
                lookup_tier       = EXCLUDED.lookup_tier,
                confidence        = EXCLUDED.confidence,
                metadata          = EXCLUDED.metadata,
                created_at        = EXCLUDED.created_at,
                last_accessed_at  = EXCLUDED.last_accessed_at,
                lookup_successful = EXCLUDED.lookup_successful
            WHERE NOT t.lookup_successful OR EXCLUDED.lookup_successful
            "#
        )
    }

    fn key_clause(key: &CacheKey) -> (&'static str, &str) {
        match key {
            CacheKey::Website(website) => ("website = $1", website.as_str()),
            CacheKey::Name(name) => ("normalized_name = $1 AND website IS NULL", name.as_str()),
        }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let (clause, value) = Self::key_clause(key);
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE {clause} LIMIT 1", self.table);
        let row = sqlx::query_as::<_, CacheRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CacheEntry::try_from).transpose()
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        sqlx::query(&self.upsert_sql(&entry.key()))
            .bind(&entry.normalized_name)
            .bind(&entry.website_key)
            .bind(&entry.original_name)
            .bind(entry.resolved_id.map(|id| id.0))
            .bind(entry.lookup_tier.as_str())
            .bind(entry.confidence)
            .bind(&entry.metadata)
            .bind(entry.created_at)
            .bind(entry.last_accessed_at)
            .bind(entry.lookup_successful)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_hit(&self, entry: &CacheEntry, at: DateTime<Utc>) -> Result<(), CacheError> {
        let key = entry.key();
        let (clause, value) = Self::key_clause(&key);
        let sql = format!(
            "UPDATE {} SET hit_count = hit_count + 1, last_accessed_at = $2 WHERE {clause}",
            self.table
        );
        sqlx::query(&sql)
            .bind(value)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let sql = format!(
            "SELECT lookup_tier, COUNT(*)::BIGINT, COALESCE(SUM(hit_count), 0)::BIGINT \
             FROM {} GROUP BY lookup_tier",
            self.table
        );
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut stats = CacheStats::default();
        for (tier, entries, hits) in rows {
            let tier: LookupTier = tier.parse().map_err(CacheError::Malformed)?;
            stats.total_entries += entries.max(0) as u64;
            stats.total_hits += hits.max(0) as u64;
            *stats.tier_distribution.entry(tier).or_insert(0) += entries.max(0) as u64;
        }
        Ok(stats)
    }
}
