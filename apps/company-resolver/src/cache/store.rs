use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::CacheError;
use crate::models::cache::{CacheEntry, CacheKey, CacheStats};

/// Backing store for resolution cache entries.
///
/// Contract shared by every backend:
/// - one row per [`CacheKey`]; `upsert` merges on that key,
/// - `upsert` never replaces a positive row with a negative one,
/// - `upsert` never touches the `hit_count` of an existing row,
/// - `record_hit` bumps `hit_count` by one and sets `last_accessed_at`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    async fn record_hit(&self, entry: &CacheEntry, at: DateTime<Utc>) -> Result<(), CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Process-local store. Used in tests and when no durable store is configured.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry verbatim, bypassing upsert rules.
    pub async fn seed(&self, entry: CacheEntry) {
        self.entries.write().await.insert(entry.key(), entry);
    }

    pub async fn snapshot(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.key()) {
            Some(existing) if existing.is_positive() && !entry.lookup_successful => {}
            Some(existing) => {
                let hit_count = existing.hit_count;
                *existing = CacheEntry {
                    hit_count,
                    ..entry.clone()
                };
            }
            None => {
                entries.insert(entry.key(), entry.clone());
            }
        }
        Ok(())
    }

    async fn record_hit(&self, entry: &CacheEntry, at: DateTime<Utc>) -> Result<(), CacheError> {
        if let Some(existing) = self.entries.write().await.get_mut(&entry.key()) {
            existing.hit_count += 1;
            existing.last_accessed_at = at;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for entry in self.entries.read().await.values() {
            stats.record(entry.lookup_tier, entry.hit_count);
        }
        Ok(stats)
    }
}
