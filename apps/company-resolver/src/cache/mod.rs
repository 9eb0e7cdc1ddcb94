//! Resolution cache: positive and negative resolutions keyed by website or normalized name.
//!
//! Store outages never fail a resolution: reads degrade to a miss, writes are dropped
//! with a warning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::cache::{CacheEntry, CacheKey, CacheStats};

pub mod postgres;
pub mod rest;
pub mod store;

pub use postgres::PgCacheStore;
pub use rest::RestCacheStore;
pub use store::{CacheStore, MemoryCacheStore};

#[derive(Clone)]
pub struct ResolutionCache {
    store: Arc<dyn CacheStore>,
    negative_ttl: chrono::Duration,
}

impl ResolutionCache {
    pub fn new(store: Arc<dyn CacheStore>, negative_ttl: chrono::Duration) -> Self {
        Self {
            store,
            negative_ttl,
        }
    }

    /// Looks up by website key when given, else by normalized name.
    ///
    /// A usable positive hit is counted (`hit_count + 1`, `last_accessed_at = now`)
    /// before it is returned. Negative and unusable entries are returned untouched.
    pub async fn get(&self, normalized_name: &str, website_key: Option<&str>) -> Option<CacheEntry> {
        let key = CacheKey::for_lookup(normalized_name, website_key);
        let mut entry = match self.store.find(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Cache miss for {key}");
                return None;
            }
            Err(e) => {
                warn!("Cache read for {key} failed, continuing without cache: {e}");
                return None;
            }
        };

        if entry.is_positive() && entry.to_resolved().is_none() {
            // nothing reusable, so not a hit
            warn!("Cached entry for {key} is positive but has no usable tier");
        } else if entry.is_positive() {
            let now = Utc::now();
            if let Err(e) = self.store.record_hit(&entry, now).await {
                warn!("Failed to record cache hit for {key}: {e}");
            }
            entry.hit_count += 1;
            entry.last_accessed_at = now;
            debug!("Cache hit for {key} (hits: {})", entry.hit_count);
        }

        Some(entry)
    }

    /// Upserts an entry. A negative entry never replaces a positive one.
    pub async fn put(&self, entry: &CacheEntry) {
        if let Err(e) = self.store.upsert(entry).await {
            warn!("Cache write for {} failed, result not persisted: {e}", entry.key());
        }
    }

    /// True while a negative entry still suppresses live lookups.
    pub fn is_negative_and_fresh(&self, entry: &CacheEntry) -> bool {
        self.is_negative_and_fresh_at(entry, Utc::now())
    }

    pub fn is_negative_and_fresh_at(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        !entry.lookup_successful && now - entry.created_at < self.negative_ttl
    }

    /// Totals for observability; empty when the store is unreachable.
    pub async fn stats(&self) -> CacheStats {
        match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Cache stats unavailable: {e}");
                CacheStats::default()
            }
        }
    }
}
