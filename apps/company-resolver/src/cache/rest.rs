use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::store::CacheStore;
use crate::errors::CacheError;
use crate::models::cache::{CacheEntry, CacheKey, CacheStats, LookupTier};
use crate::models::company::CompanyId;

/// Conditional hit updates tried before giving up under heavy contention.
const HIT_UPDATE_ATTEMPTS: u32 = 5;

/// Upsert payload. `hit_count` is left out so a merge never resets it.
#[derive(Serialize)]
struct UpsertRow<'a> {
    normalized_name: &'a str,
    website: Option<&'a str>,
    original_name: &'a str,
    company_id: Option<CompanyId>,
    lookup_tier: LookupTier,
    confidence: f64,
    metadata: &'a Value,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    lookup_successful: bool,
}

impl<'a> From<&'a CacheEntry> for UpsertRow<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            normalized_name: &entry.normalized_name,
            website: entry.website_key.as_deref(),
            original_name: &entry.original_name,
            company_id: entry.resolved_id,
            lookup_tier: entry.lookup_tier,
            confidence: entry.confidence,
            metadata: &entry.metadata,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            lookup_successful: entry.lookup_successful,
        }
    }
}

#[derive(Deserialize)]
struct StatsRow {
    lookup_tier: LookupTier,
    #[serde(default)]
    hit_count: i64,
}

/// Cache store behind a generic REST data-store (PostgREST dialect):
/// equality filters on `GET`, merge-duplicates upserts on `POST`, conditional `PATCH` for hits.
#[derive(Clone)]
pub struct RestCacheStore {
    client: Client,
    table_url: String,
    api_key: String,
}

impl RestCacheStore {
    pub fn new(base_url: &str, api_key: String, table: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build cache store HTTP client")?;
        Ok(Self {
            client,
            table_url: format!("{}/{}", base_url.trim_end_matches('/'), table),
            api_key,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Equality filter selecting exactly the row for `key`.
    fn key_filter(key: &CacheKey) -> Vec<(&'static str, String)> {
        match key {
            CacheKey::Website(website) => vec![("website", format!("eq.{website}"))],
            CacheKey::Name(name) => vec![
                ("normalized_name", format!("eq.{name}")),
                ("website", "is.null".to_string()),
            ],
        }
    }

    fn conflict_target(key: &CacheKey) -> &'static str {
        match key {
            CacheKey::Website(_) => "website",
            CacheKey::Name(_) => "normalized_name",
        }
    }
}

async fn check_status(response: Response) -> Result<Response, CacheError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(CacheError::Unavailable(format!("status {status}: {body}")))
    } else {
        Err(CacheError::Malformed(format!("status {status}: {body}")))
    }
}

#[async_trait]
impl CacheStore for RestCacheStore {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let response = self
            .authorized(self.client.get(&self.table_url))
            .query(&Self::key_filter(key))
            .query(&[("limit", "1")])
            .send()
            .await?;
        let rows: Vec<CacheEntry> = check_status(response).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let key = entry.key();
        if !entry.lookup_successful {
            if let Some(existing) = self.find(&key).await? {
                if existing.is_positive() {
                    debug!("Keeping positive cache entry for {key}; negative result dropped");
                    return Ok(());
                }
            }
        }

        let response = self
            .authorized(self.client.post(&self.table_url))
            .query(&[("on_conflict", Self::conflict_target(&key))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[UpsertRow::from(entry)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Compare-and-set on `hit_count`: the PATCH only applies while the row still
    /// holds the count last seen, so concurrent readers never lose or undo a hit.
    async fn record_hit(&self, entry: &CacheEntry, at: DateTime<Utc>) -> Result<(), CacheError> {
        let key = entry.key();
        let mut observed = entry.hit_count;

        for _ in 0..HIT_UPDATE_ATTEMPTS {
            let response = self
                .authorized(self.client.patch(&self.table_url))
                .query(&Self::key_filter(&key))
                .query(&[("hit_count", format!("eq.{observed}"))])
                .header("Prefer", "return=representation")
                .json(&json!({
                    "hit_count": observed + 1,
                    "last_accessed_at": at,
                }))
                .send()
                .await?;
            let updated: Vec<Value> = check_status(response).await?.json().await?;
            if !updated.is_empty() {
                return Ok(());
            }

            match self.find(&key).await? {
                Some(current) => {
                    debug!(
                        "Hit count for {key} moved from {observed} to {}; retrying",
                        current.hit_count
                    );
                    observed = current.hit_count;
                }
                None => {
                    debug!("Cache row for {key} disappeared before its hit was recorded");
                    return Ok(());
                }
            }
        }

        Err(CacheError::Unavailable(format!(
            "hit count for {key} kept changing after {HIT_UPDATE_ATTEMPTS} attempts"
        )))
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let response = self
            .authorized(self.client.get(&self.table_url))
            .query(&[("select", "lookup_tier,hit_count")])
            .send()
            .await?;
        let rows: Vec<StatsRow> = check_status(response).await?.json().await?;

        let mut stats = CacheStats::default();
        for row in rows {
            stats.record(row.lookup_tier, row.hit_count);
        }
        Ok(stats)
    }
}
